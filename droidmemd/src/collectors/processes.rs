use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use super::meminfo::parse_kb;
use crate::priority::PriorityTable;
use crate::types::ProcessRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeEntry {
    pub pss_kb: u64,
    pub package: String,
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityEntry {
    pub code: String,
    pub pid: u32,
    pub package: String,
    pub user: Option<String>,
}

// Per-process lines; category and OOM subtotals carry no "(pid" and never match.
const SIZE_LINE_FORMATS: &[&str] = &[
    //     248,671K: com.google.android.gms (pid 1234 / activities)
    r"^\s+(\d[\d,.]*)K:\s+(\S+)\s+\(pid\s+(\d+)",
    //     248671 kB: com.google.android.gms (pid 1234)
    r"^\s+(\d+)\s+kB:\s+(\S+)\s+\(pid\s+(\d+)",
];

// The gap between the code and the pid is free-form flags that changed
// between releases, so it is skipped with a bounded lazy match.
const PRIORITY_LINE_FORMATS: &[&str] = &[
    //   Proc #42: fore  T/A/FGS  trm: 0 3456:com.whatsapp/u0a123 (service)
    r"(?:Proc|PERS)\s*#\s*\d+:\s+([A-Za-z]+)(?:\+\s*\d+)?\s.{0,60}?\btrm:\s*\d+\s+(\d+):([^/\s]+)(?:/(\S+))?",
    //   Proc # 0: fg     T/A/TOP  LCMNFUA  t: 0 9993:com.android.settings/1000 (top-activity)
    //   PERS #98: sys    F/ /PER  LCMNFUA  t: 0 2052:system/1000 (fixed)
    r"(?:Proc|PERS)\s*#\s*\d+:\s+([A-Za-z]+)(?:\+\s*\d+)?\s.{0,60}?\bt:\s*\d+\s+(\d+):([^/\s]+)(?:/(\S+))?",
];

static SIZE_LINES: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(SIZE_LINE_FORMATS));
static PRIORITY_LINES: Lazy<Vec<Regex>> = Lazy::new(|| compile_all(PRIORITY_LINE_FORMATS));
static SECTION_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*Total PSS by process:\s*$").expect("section pattern"));
// Any unindented "...:" header ends the per-process block.
static SECTION_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S.*:\s*$").expect("section pattern"));

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("built-in process pattern"))
        .collect()
}

fn per_process_section(text: &str) -> Vec<&str> {
    let mut lines = text.lines();
    if lines.any(|line| SECTION_START.is_match(line)) {
        lines
            .take_while(|line| !SECTION_END.is_match(line))
            .collect()
    } else {
        log::debug!("[collector] no per-process PSS header; scanning whole dump");
        text.lines().collect()
    }
}

/// Extract `(pss, package, pid)` from the per-process section of
/// `dumpsys meminfo`, keeping only the first line seen for each package.
pub fn parse_size_table(text: &str) -> Vec<SizeEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for line in per_process_section(text) {
        let Some(caps) = SIZE_LINES.iter().find_map(|re| re.captures(line)) else {
            continue;
        };
        let (Some(pss_kb), Ok(pid)) = (parse_kb(&caps[1]), caps[3].parse::<u32>()) else {
            continue;
        };
        let package = caps[2].to_string();
        if seen.insert(package.clone()) {
            entries.push(SizeEntry {
                pss_kb,
                package,
                pid,
            });
        }
    }
    entries
}

pub fn parse_priority_table(text: &str) -> Vec<PriorityEntry> {
    text.lines()
        .filter_map(|line| PRIORITY_LINES.iter().find_map(|re| re.captures(line)))
        .filter_map(|caps| {
            Some(PriorityEntry {
                code: caps[1].to_ascii_lowercase(),
                pid: caps[2].parse().ok()?,
                package: caps[3].to_string(),
                user: caps.get(4).map(|m| m.as_str().to_string()),
            })
        })
        .collect()
}

/// Join sizes with priorities on package name. Packages the priority dump
/// does not mention get the table's fallback code; a package listed more
/// than once keeps its most protective (lowest score) entry.
pub fn merge_inventory(
    sizes: Vec<SizeEntry>,
    priorities: &[PriorityEntry],
    table: &PriorityTable,
) -> Vec<ProcessRecord> {
    let mut by_package: HashMap<&str, &PriorityEntry> = HashMap::new();
    for entry in priorities {
        by_package
            .entry(entry.package.as_str())
            .and_modify(|kept| {
                if table.score(&entry.code) < table.score(&kept.code) {
                    *kept = entry;
                }
            })
            .or_insert(entry);
    }

    let mut records: Vec<ProcessRecord> = sizes
        .into_iter()
        .map(|size| {
            let (code, pid, user) = match by_package.get(size.package.as_str()) {
                Some(p) => (
                    p.code.clone(),
                    if p.pid != 0 { p.pid } else { size.pid },
                    p.user.clone(),
                ),
                None => (table.fallback_code.clone(), size.pid, None),
            };
            let class = table.lookup(&code);
            ProcessRecord {
                pid,
                package: size.package,
                pss_kb: size.pss_kb,
                priority_label: class.label.clone(),
                kill_score: class.score,
                priority_code: code,
                user,
            }
        })
        .collect();

    records.sort_by(|a, b| b.pss_kb.cmp(&a.pss_kb));
    records
}

/// Full inventory. `activity_dump` is `None` when the device refused the
/// priority query; every package then carries the fallback code.
pub fn build_inventory(
    meminfo_dump: &str,
    activity_dump: Option<&str>,
    table: &PriorityTable,
) -> Vec<ProcessRecord> {
    let sizes = parse_size_table(meminfo_dump);
    let priorities = activity_dump.map(parse_priority_table).unwrap_or_default();
    log::debug!(
        "[collector] {} sized processes, {} priority entries",
        sizes.len(),
        priorities.len()
    );
    merge_inventory(sizes, &priorities, table)
}
