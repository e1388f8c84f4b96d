//! Store statistics

use std::fmt;

use crate::catalog::CatalogStats;

/// SI magnitude suffixes, one per factor of 1000
const SUFFIXES: &[char] = &[' ', 'k', 'M', 'G', 'T', 'P', 'E', 'Z'];

/// Aggregate statistics for the whole store or one variable
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
    /// Variable the stats are restricted to
    pub variable: Option<String>,
    pub stats: CatalogStats,
}

impl fmt::Display for StoreInfo {
    /// `3 variables, 12 pages, 1.2M records, 9.6MB total, 800kB/page`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        let mut parts = Vec::new();
        if self.variable.is_none() {
            parts.push(format!("{} variables", human_readable(s.variables as f64)));
        }
        if s.pages > 0 {
            parts.push(format!("{} pages", human_readable(s.pages as f64)));
            parts.push(format!("{} records", human_readable(s.records as f64)));
            parts.push(format!("{}B total", human_readable(s.total_bytes as f64)));
            parts.push(format!("{}B/page", human_readable(s.average_bytes)));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Format a magnitude with four significant digits and an SI suffix
///
/// `0 → "0"`, `1234 → "1.234k"`, `2.5e9 → "2.5G"`
pub fn human_readable(size: f64) -> String {
    let mut scaled = size;
    let mut order = 0;
    while scaled.abs() >= 1000.0 && order < SUFFIXES.len() - 1 {
        scaled /= 1000.0;
        order += 1;
    }
    format!("{}{}", significant(scaled, 4), SUFFIXES[order])
        .trim_end()
        .to_string()
}

fn significant(value: f64, digits: i32) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{}", value);
    }
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, value);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}
