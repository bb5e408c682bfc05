//! Host resource snapshot reported by `docqa status`.
//!
//! Local models share the machine with everything else, so memory pressure
//! and CPU load are shown next to the model server check.

use serde::Serialize;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub memory_percent: f64,
    pub available_memory_gb: f64,
    pub cpu_percent: f32,
}

/// Sample memory and global CPU usage. CPU usage needs two refreshes spaced
/// by the minimum update interval, so this waits briefly.
pub async fn sample() -> SystemStats {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();
    tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu_usage();

    let total = sys.total_memory();
    let used = sys.used_memory();
    SystemStats {
        memory_used_gb: used as f64 / GIB,
        memory_total_gb: total as f64 / GIB,
        memory_percent: if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        },
        available_memory_gb: sys.available_memory() as f64 / GIB,
        cpu_percent: sys.global_cpu_usage(),
    }
}
