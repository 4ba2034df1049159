use bluetooth_discovery::domain::models::DeviceList;
use bluetooth_discovery::domain::platform::{BluetoothAdapter, BroadcastChannel, PermissionGate};
use bluetooth_discovery::domain::settings::{Settings, SettingsService};
use bluetooth_discovery::infrastructure::logging;
use bluetooth_discovery::{BluetoothController, DiscoveryController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

struct Backend {
    adapter: Box<dyn BluetoothAdapter>,
    broadcasts: Box<dyn BroadcastChannel>,
    permissions: Arc<dyn PermissionGate>,
    advertiser: Option<tokio::task::JoinHandle<()>>,
}

#[cfg(windows)]
fn build_backend(settings: &Settings) -> anyhow::Result<Backend> {
    use bluetooth_discovery::infrastructure::bluetooth::{AppCapabilityPermissions, WinRtBluetooth};

    let bluetooth = WinRtBluetooth::new(settings.discovery.scanning_mode)?;
    Ok(Backend {
        adapter: Box::new(bluetooth.clone()),
        broadcasts: Box::new(bluetooth),
        permissions: Arc::new(AppCapabilityPermissions),
        advertiser: None,
    })
}

#[cfg(not(windows))]
fn build_backend(settings: &Settings) -> anyhow::Result<Backend> {
    use bluetooth_discovery::infrastructure::bluetooth::{SimulatedPlatform, StaticPermissions};

    let simulation = &settings.simulation;
    info!(
        "No native Bluetooth backend on this platform, using the simulated adapter (platform version {})",
        simulation.platform_version
    );

    let platform = SimulatedPlatform::new(simulation.platform_version);
    platform.set_bonded(simulation.bonded_devices.clone());
    let advertiser = platform.advertise(
        simulation.advertising_devices.clone(),
        Duration::from_millis(simulation.advertising_interval_ms.max(1)),
    );

    Ok(Backend {
        adapter: Box::new(platform.clone()),
        broadcasts: Box::new(platform),
        permissions: Arc::new(StaticPermissions::all_granted()),
        advertiser: Some(advertiser),
    })
}

fn print_devices(title: &str, devices: &DeviceList) {
    println!("{} ({}):", title, devices.len());
    for device in devices.iter() {
        println!("  {:<24} {}", device.display_name(), device.address);
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let backend = build_backend(&settings)?;
    let controller = DiscoveryController::new(backend.adapter, backend.broadcasts, backend.permissions);
    let (handle, worker) = controller.spawn_on_thread()?;

    let mut scanned: watch::Receiver<DeviceList> = handle.scanned_devices();
    let mut paired = handle.paired_devices();
    print_devices("Paired devices", &paired.borrow_and_update());

    handle.start_discovery();

    let deadline = tokio::time::sleep(Duration::from_secs(settings.discovery.scan_duration_secs));
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Scan duration elapsed");
                break;
            }
            _ = &mut interrupted => {
                info!("Interrupted");
                break;
            }
            changed = scanned.changed() => {
                if changed.is_err() {
                    break;
                }
                let devices = scanned.borrow_and_update().clone();
                if let Some(latest) = devices.last() {
                    info!("Found {}", latest);
                }
            }
            changed = paired.changed() => {
                if changed.is_err() {
                    break;
                }
                print_devices("Paired devices", &paired.borrow_and_update());
            }
        }
    }

    handle.stop_discovery();
    handle.release();

    print_devices("Scanned devices", &scanned.borrow());

    if let Some(advertiser) = backend.advertiser {
        advertiser.abort();
    }
    drop(handle);
    drop(scanned);
    drop(paired);
    if worker.join().is_err() {
        error!("Discovery thread panicked");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;
    let settings = settings_service.get().clone();

    let _logging_guard = logging::init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!(
        "Starting Bluetooth discovery (settings: {})",
        settings_service.path().display()
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(settings))
}
