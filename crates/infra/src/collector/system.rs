//! Host and process readings via `sysinfo`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use sysinfo::{get_current_pid, Pid, ProcessesToUpdate, System};
use tally_core::SampleSource;
use tally_domain::constants::{POLL_COUNT_METRIC, RANDOM_VALUE_METRIC};
use tally_domain::{MetricSample, Result, TallyError};
use tokio::task;
use tracing::debug;

/// Samples memory, per-core CPU and this process's footprint.
///
/// Every poll also bumps `PollCount` by one and draws a fresh
/// `RandomValue`.
pub struct SystemSampleSource {
    system: Arc<Mutex<System>>,
    pid: Option<Pid>,
}

impl SystemSampleSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu_usage();

        Self { system: Arc::new(Mutex::new(system)), pid: get_current_pid().ok() }
    }
}

impl Default for SystemSampleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for SystemSampleSource {
    async fn collect(&self) -> Result<BTreeMap<String, MetricSample>> {
        let system = Arc::clone(&self.system);
        let pid = self.pid;

        let mut samples = task::spawn_blocking(move || read_system(&mut system.lock(), pid))
            .await
            .map_err(|e| TallyError::Internal(format!("system sampling task failed: {e}")))?;

        samples.insert(POLL_COUNT_METRIC.to_string(), MetricSample::Counter(1));
        samples.insert(
            RANDOM_VALUE_METRIC.to_string(),
            MetricSample::Gauge(rand::thread_rng().gen::<f64>()),
        );

        debug!(samples = samples.len(), "system sampled");
        Ok(samples)
    }
}

fn read_system(system: &mut System, pid: Option<Pid>) -> BTreeMap<String, MetricSample> {
    system.refresh_memory();
    system.refresh_cpu_usage();

    let mut samples = BTreeMap::new();
    let mut gauge = |name: String, value: f64| {
        samples.insert(name, MetricSample::Gauge(value));
    };

    gauge("TotalMemory".to_string(), system.total_memory() as f64);
    gauge("FreeMemory".to_string(), system.free_memory() as f64);
    gauge("UsedMemory".to_string(), system.used_memory() as f64);

    for (index, cpu) in system.cpus().iter().enumerate() {
        gauge(format!("CPUutilization{index}"), f64::from(cpu.cpu_usage()));
    }

    if let Some(pid) = pid {
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        if let Some(process) = system.process(pid) {
            gauge("ResidentMemory".to_string(), process.memory() as f64);
            gauge("VirtualMemory".to_string(), process.virtual_memory() as f64);
        }
    }

    samples
}
