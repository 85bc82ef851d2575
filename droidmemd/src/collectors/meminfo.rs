//! `dumpsys meminfo` parsers, with `/proc/meminfo` as the fallback.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;
use crate::types::MemorySnapshot;

struct DumpFormat {
    name: &'static str,
    total: &'static str,
    used: &'static str,
    free: &'static str,
    lost: Option<&'static str>,
    status: Option<&'static str>,
}

const DUMPSYS_FORMATS: &[DumpFormat] = &[
    // Total RAM: 3,764,392K (status normal)
    DumpFormat {
        name: "summary",
        total: r"(?im)Total RAM:\s+(\d[\d,.]*)\s*K",
        used: r"(?im)Used RAM:\s+(\d[\d,.]*)\s*K",
        free: r"(?im)Free RAM:\s+(\d[\d,.]*)\s*K",
        lost: Some(r"(?im)Lost RAM:\s+(-?\d[\d,.]*)\s*K"),
        status: Some(r"(?im)Total RAM:.*\(status\s+(\w+)\)"),
    },
    // dumpsys meminfo -c: ram,<total>,<free>,<used>
    DumpFormat {
        name: "checkin",
        total: r"(?m)^ram,(\d+),",
        used: r"(?m)^ram,\d+,\d+,(\d+)",
        free: r"(?m)^ram,\d+,(\d+),",
        lost: Some(r"(?m)^lostram,(-?\d+)"),
        status: None,
    },
];

struct CompiledFormat {
    name: &'static str,
    total: Regex,
    used: Regex,
    free: Regex,
    lost: Option<Regex>,
    status: Option<Regex>,
}

static DUMPSYS: Lazy<Vec<CompiledFormat>> = Lazy::new(|| {
    DUMPSYS_FORMATS
        .iter()
        .map(|f| CompiledFormat {
            name: f.name,
            total: compile(f.total),
            used: compile(f.used),
            free: compile(f.free),
            lost: f.lost.map(compile),
            status: f.status.map(compile),
        })
        .collect()
});

static MEM_TOTAL: Lazy<Regex> = Lazy::new(|| compile(r"(?m)^MemTotal:\s+(\d+)\s*kB"));

// Preferred first: MemAvailable counts reclaimable cache, MemFree does not.
static PROC_FREE_FIELDS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?m)^MemAvailable:\s+(\d+)\s*kB", r"(?m)^MemFree:\s+(\d+)\s*kB"]
        .into_iter()
        .map(compile)
        .collect()
});

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in meminfo pattern")
}

/// Digits only; accepts `3,764,392`, `3.764.392` and `3764392`.
/// A negative figure (seen for lost RAM) is clamped to zero.
pub(crate) fn parse_kb(raw: &str) -> Option<u64> {
    if raw.trim_start().starts_with('-') {
        return Some(0);
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn capture_kb(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_kb(m.as_str()))
}

/// Parse `dumpsys meminfo`. Fails rather than guessing when total, used and
/// free are not all present, so the caller can switch to the fallback source.
pub fn parse_meminfo_dump(text: &str) -> Result<MemorySnapshot, ParseError> {
    const DUMP: &str = "dumpsys meminfo";
    if text.trim().is_empty() {
        return Err(ParseError::EmptyDump { dump: DUMP });
    }

    for format in DUMPSYS.iter() {
        let (Some(total_kb), Some(used_kb), Some(free_kb)) = (
            capture_kb(&format.total, text),
            capture_kb(&format.used, text),
            capture_kb(&format.free, text),
        ) else {
            continue;
        };

        let lost_kb = format
            .lost
            .as_ref()
            .and_then(|re| capture_kb(re, text))
            .unwrap_or(0);
        let status = format
            .status
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| MemorySnapshot::NEUTRAL_STATUS.to_string());

        log::debug!("[collector] meminfo matched `{}` format", format.name);
        return Ok(MemorySnapshot {
            total_kb,
            used_kb,
            free_kb,
            lost_kb,
            status,
            captured_at: Utc::now(),
        });
    }

    let primary = &DUMPSYS[0];
    let missing: Vec<&str> = [
        ("total", &primary.total),
        ("used", &primary.used),
        ("free", &primary.free),
    ]
    .into_iter()
    .filter(|(_, re)| capture_kb(re, text).is_none())
    .map(|(name, _)| name)
    .collect();

    Err(ParseError::MissingFields {
        dump: DUMP,
        missing: missing.join(", "),
    })
}

/// Parse `/proc/meminfo`. Used is derived as total minus available (or
/// free); lost is always zero and the status neutral.
pub fn parse_proc_meminfo_dump(text: &str) -> Result<MemorySnapshot, ParseError> {
    const DUMP: &str = "/proc/meminfo";
    if text.trim().is_empty() {
        return Err(ParseError::EmptyDump { dump: DUMP });
    }

    let total_kb = capture_kb(&MEM_TOTAL, text);
    let free_kb = PROC_FREE_FIELDS.iter().find_map(|re| capture_kb(re, text));

    match (total_kb, free_kb) {
        (Some(total_kb), Some(free_kb)) => Ok(MemorySnapshot {
            total_kb,
            used_kb: total_kb.saturating_sub(free_kb),
            free_kb,
            lost_kb: 0,
            status: MemorySnapshot::NEUTRAL_STATUS.to_string(),
            captured_at: Utc::now(),
        }),
        (total, _) => Err(ParseError::MissingFields {
            dump: DUMP,
            missing: if total.is_none() {
                "MemTotal".to_string()
            } else {
                "MemAvailable, MemFree".to_string()
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMPSYS_SUMMARY: &str = "\
Total PSS by category:
    512,000K: Dalvik
Total RAM: 3,764,392K (status normal)
 Free RAM: 1,234,567K (  234,567K cached pss +   900,000K cached kernel +   100,000K free)
 Used RAM: 2,345,678K (2,000,000K used pss +   345,678K kernel)
 Lost RAM:   184,147K
     ZRAM:    12,345K physical used for    45,678K in swap (2,097,148K total swap)
";

    const PROC_MEMINFO: &str = "\
MemTotal:        3764392 kB
MemFree:          123456 kB
MemAvailable:    1500000 kB
Buffers:           12345 kB
";

    #[test]
    fn test_parse_summary_format() {
        let snap = parse_meminfo_dump(DUMPSYS_SUMMARY).unwrap();
        assert_eq!(snap.total_kb, 3_764_392);
        assert_eq!(snap.used_kb, 2_345_678);
        assert_eq!(snap.free_kb, 1_234_567);
        assert_eq!(snap.lost_kb, 184_147);
        assert_eq!(snap.status, "normal");
    }

    #[test]
    fn test_parse_summary_tolerates_separators_and_units() {
        let dump = "Total RAM: 3.764.392 kB (status LOW)\nUsed RAM: 2345678 kB\nFree RAM: 1,234,567K\n";
        let snap = parse_meminfo_dump(dump).unwrap();
        assert_eq!(snap.total_kb, 3_764_392);
        assert_eq!(snap.used_kb, 2_345_678);
        assert_eq!(snap.free_kb, 1_234_567);
        assert_eq!(snap.lost_kb, 0);
        assert_eq!(snap.status, "low");
    }

    #[test]
    fn test_negative_lost_ram_clamps_to_zero() {
        let dump = "Total RAM: 100K\nUsed RAM: 60K\nFree RAM: 40K\nLost RAM: -1,024K\n";
        assert_eq!(parse_meminfo_dump(dump).unwrap().lost_kb, 0);
    }

    #[test]
    fn test_parse_checkin_format() {
        let dump = "time,12345,67890\nram,3764392,1234567,2345678\nlostram,1000\n";
        let snap = parse_meminfo_dump(dump).unwrap();
        assert_eq!(snap.total_kb, 3_764_392);
        assert_eq!(snap.free_kb, 1_234_567);
        assert_eq!(snap.used_kb, 2_345_678);
        assert_eq!(snap.lost_kb, 1000);
        assert_eq!(snap.status, "normal");
    }

    #[test]
    fn test_missing_used_ram_is_an_error() {
        let dump = "Total RAM: 3,764,392K (status normal)\n Free RAM: 1,234,567K\n";
        let err = parse_meminfo_dump(dump).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingFields {
                dump: "dumpsys meminfo",
                missing: "used".to_string()
            }
        );
    }

    #[test]
    fn test_empty_dump_is_an_error() {
        assert!(matches!(
            parse_meminfo_dump("  \n"),
            Err(ParseError::EmptyDump { .. })
        ));
    }

    #[test]
    fn test_proc_meminfo_prefers_available() {
        let snap = parse_proc_meminfo_dump(PROC_MEMINFO).unwrap();
        assert_eq!(snap.total_kb, 3_764_392);
        assert_eq!(snap.free_kb, 1_500_000);
        assert_eq!(snap.used_kb, 2_264_392);
        assert_eq!(snap.lost_kb, 0);
        assert_eq!(snap.status, "normal");
    }

    #[test]
    fn test_proc_meminfo_uses_free_without_available() {
        let snap = parse_proc_meminfo_dump("MemTotal: 1000 kB\nMemFree: 250 kB\n").unwrap();
        assert_eq!(snap.free_kb, 250);
        assert_eq!(snap.used_kb, 750);
    }

    #[test]
    fn test_proc_meminfo_requires_total() {
        let err = parse_proc_meminfo_dump("MemFree: 250 kB\n").unwrap_err();
        assert!(err.to_string().contains("MemTotal"));
    }

    #[test]
    fn test_parse_kb() {
        assert_eq!(parse_kb("3,764,392"), Some(3_764_392));
        assert_eq!(parse_kb("3.764.392"), Some(3_764_392));
        assert_eq!(parse_kb("-5"), Some(0));
        assert_eq!(parse_kb(""), None);
    }
}
