//! Rules that derive extra runtime options from dedicated configuration keys.
//!
//! These run as a post-pass over the runtime vector after the configured
//! arguments and the classpath have been added.

use crate::assembler::ArgumentVector;
use crate::config::{ConfigView, HEAP_MAX_PERCENT, HEAP_MIN_PERCENT};
use crate::error::LaunchError;
use log::{info, warn};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeapBound {
    Max,
    Initial,
}

impl HeapBound {
    fn key(self) -> &'static str {
        match self {
            HeapBound::Max => HEAP_MAX_PERCENT,
            HeapBound::Initial => HEAP_MIN_PERCENT,
        }
    }

    fn flag(self) -> &'static str {
        match self {
            HeapBound::Max => "-Xmx",
            HeapBound::Initial => "-Xms",
        }
    }
}

fn heap_option_regex() -> &'static Regex {
    static HEAP: OnceLock<Regex> = OnceLock::new();
    HEAP.get_or_init(|| {
        Regex::new(r"^(?:-Xm([xs])\d+[kKmMgGtT]?|-XX:(Max|Initial)HeapSize=\S+)$").expect("valid regex")
    })
}

/// Whether `args` already sets the given heap bound explicitly.
fn has_heap_option(args: &ArgumentVector, bound: HeapBound) -> bool {
    let re = heap_option_regex();
    args.as_slice().iter().any(|arg| {
        re.captures(arg).is_some_and(|caps| {
            let which = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match bound {
                HeapBound::Max => which == "x" || which == "Max",
                HeapBound::Initial => which == "s" || which == "Initial",
            }
        })
    })
}

fn percent(config: &dyn ConfigView, bound: HeapBound) -> Option<u64> {
    let raw = config.get(bound.key())?.trim();
    match raw.parse::<u64>() {
        Ok(p) if (1..=100).contains(&p) => Some(p),
        _ => {
            warn!("ignoring {}={raw}: expected a percentage from 1 to 100", bound.key());
            None
        }
    }
}

/// Append `-Xmx`/`-Xms` options derived from the heap percentage keys.
///
/// An explicit heap option already present in `args` always wins. Nothing is
/// added when physical memory is unknown.
pub fn apply_heap_rules(
    config: &dyn ConfigView,
    args: &mut ArgumentVector,
    total_memory_mb: Option<u64>,
) -> Result<(), LaunchError> {
    for bound in [HeapBound::Max, HeapBound::Initial] {
        let Some(pct) = percent(config, bound) else {
            continue;
        };
        if has_heap_option(args, bound) {
            info!("{} already set, ignoring {}", bound.flag(), bound.key());
            continue;
        }
        let Some(total) = total_memory_mb else {
            warn!("physical memory unknown, ignoring {}", bound.key());
            continue;
        };
        let size = (total * pct / 100).max(1);
        args.push(format!("{}{size}m", bound.flag()))?;
    }
    Ok(())
}

/// Total physical memory in megabytes, if the platform reports it.
#[cfg(unix)]
pub fn physical_memory_mb() -> Option<u64> {
    // SAFETY: sysconf only reads system configuration values.
    let (pages, page_size) = unsafe {
        (
            libc::sysconf(libc::_SC_PHYS_PAGES),
            libc::sysconf(libc::_SC_PAGESIZE),
        )
    };
    if pages <= 0 || page_size <= 0 {
        return None;
    }
    Some((pages as u64).saturating_mul(page_size as u64) / (1024 * 1024))
}

/// Total physical memory in megabytes, if the platform reports it.
#[cfg(not(unix))]
pub fn physical_memory_mb() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IniConfig;

    fn vm_args(items: &[&str]) -> ArgumentVector {
        let mut args = ArgumentVector::new("vm");
        for item in items {
            args.push(item.to_string()).unwrap();
        }
        args
    }

    #[test]
    fn test_max_percent_appends_xmx() {
        let config = IniConfig::from_pairs([(HEAP_MAX_PERCENT, "50")]);
        let mut args = vm_args(&["-Dfoo=bar"]);
        apply_heap_rules(&config, &mut args, Some(8192)).unwrap();
        assert_eq!(args.as_slice(), ["-Dfoo=bar", "-Xmx4096m"]);
    }

    #[test]
    fn test_explicit_xmx_wins() {
        let config = IniConfig::from_pairs([(HEAP_MAX_PERCENT, "50"), (HEAP_MIN_PERCENT, "10")]);
        let mut args = vm_args(&["-Xmx512m"]);
        apply_heap_rules(&config, &mut args, Some(1000)).unwrap();
        assert_eq!(args.as_slice(), ["-Xmx512m", "-Xms100m"]);
    }

    #[test]
    fn test_max_heap_size_flag_counts_as_explicit() {
        let config = IniConfig::from_pairs([(HEAP_MAX_PERCENT, "25")]);
        let mut args = vm_args(&["-XX:MaxHeapSize=1g"]);
        apply_heap_rules(&config, &mut args, Some(1000)).unwrap();
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_invalid_percent_or_unknown_memory_is_ignored() {
        let config = IniConfig::from_pairs([(HEAP_MAX_PERCENT, "150"), (HEAP_MIN_PERCENT, "x")]);
        let mut args = vm_args(&[]);
        apply_heap_rules(&config, &mut args, Some(1000)).unwrap();
        assert!(args.is_empty());

        let config = IniConfig::from_pairs([(HEAP_MAX_PERCENT, "50")]);
        apply_heap_rules(&config, &mut args, None).unwrap();
        assert!(args.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_physical_memory_is_reported() {
        assert!(physical_memory_mb().is_some_and(|mb| mb > 0));
    }
}
