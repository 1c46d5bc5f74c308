//! Utility functions
/// transform bytes into a human readable format.
pub fn to_human_readable(n: u64) -> String {
    let mut n = n as f64;

    let units = ["B", "KB", "MB", "GB", "TB", "PB"];
    let delimiter = 1000_f64;

    if n < delimiter {
        return format!("{n} B");
    }

    let mut u = 0;
    while (n * 10.0).round() / 10.0 >= delimiter && u < units.len() - 1 {
        n /= delimiter;
        u += 1;
    }

    format!("{:.2} {}", n, units[u])
}
