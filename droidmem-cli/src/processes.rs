use colored::*;

use droidmemd::{KillCandidate, ProcessRecord};

fn score_color(score: u8) -> Color {
    match score {
        0 => Color::Red,
        1 | 2 => Color::Yellow,
        3 | 4 => Color::Green,
        _ => Color::Blue,
    }
}

fn print_header() {
    println!(
        "{:<8} {:>10} {:<8} {:<12} {:<5} PACKAGE",
        "PID", "PSS(MB)", "PRIO", "LABEL", "SCORE"
    );
}

fn print_row(p: &ProcessRecord) {
    println!(
        "{:<8} {:>10.1} {:<8} {:<12} {:<5} {}",
        p.pid,
        p.pss_mb(),
        p.priority_code,
        p.priority_label,
        p.kill_score.to_string().color(score_color(p.kill_score)),
        p.package
    );
}

pub fn print_processes(processes: &[ProcessRecord]) {
    if processes.is_empty() {
        println!("{}", "No processes reported.".dimmed());
        return;
    }
    print_header();
    for p in processes {
        print_row(p);
    }
}

pub fn print_candidates(candidates: &[KillCandidate], freed_mb: f64) {
    if candidates.is_empty() {
        println!("{}", "No safe candidates right now.".dimmed());
        return;
    }
    print_header();
    for c in candidates {
        print_row(c);
    }
    println!();
    println!(
        "{}",
        format!(
            "Stopping all {} would free about {freed_mb:.1} MB",
            candidates.len()
        )
        .bold()
    );
}
