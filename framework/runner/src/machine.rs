use sysinfo::System;

/// Describe the machine the benchmark runs on, e.g. `Linux (Ubuntu 24.04), 6.8.0, x86_64`.
///
/// The configured override is used as is when given.
pub fn machine_descriptor(configured: Option<&str>) -> String {
    if let Some(machine) = configured {
        return machine.to_string();
    }

    let os = System::long_os_version().unwrap_or_else(|| std::env::consts::OS.to_string());
    match System::kernel_version() {
        Some(kernel) => format!("{os}, {kernel}, {}", std::env::consts::ARCH),
        None => format!("{os}, {}", std::env::consts::ARCH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_machine_wins() {
        assert_eq!(machine_descriptor(Some("bench-01")), "bench-01");
    }

    #[test]
    fn detected_machine_includes_arch() {
        let machine = machine_descriptor(None);
        assert!(machine.ends_with(std::env::consts::ARCH));
    }
}
