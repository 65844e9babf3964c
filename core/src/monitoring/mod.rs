//! Monitoring types, text parsers and the sampling capability shared
//! between the history store and the agent's collectors.

pub mod parser;
pub mod sampler;
pub mod types;

pub use parser::{
    cpu_percent_from_delta, memory_used_percent, parse_capacity, parse_cpu_line, parse_df_output,
    parse_meminfo_value, parse_net_dev, parse_os_release_name, parse_thermal_millidegrees,
};
pub use sampler::SystemSampler;
pub use types::{
    BatteryReading, ChargeStatus, CpuCounters, DiskUsage, InterfaceCounters, MetricsSnapshot,
    NetworkCounters,
};
