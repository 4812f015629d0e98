/// Format a duration in seconds the way the unix `time` command does, e.g. `1m3.250s`.
pub fn format_duration_secs(secs: f64) -> String {
    let minutes = (secs / 60.0).floor();
    let seconds = secs - minutes * 60.0;
    format!("{minutes:.0}m{seconds:.3}s")
}

/// Format a byte count with binary prefixes, e.g. `1.5MiB`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"] {
        if value.abs() < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}YiB")
}
