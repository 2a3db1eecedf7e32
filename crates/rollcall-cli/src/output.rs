//! Plain-text tables and JSON for the reporting commands.

use chrono::NaiveDate;
use rollcall_engine::SessionSummary;
use rollcall_store::{AttendanceRow, DepartmentSummary, Student};
use serde_json::{json, Value};

const NO_DEPARTMENT: &str = "-";

pub fn print_students(students: &[Student]) {
    if students.is_empty() {
        println!("No students registered");
        return;
    }
    println!(
        "{:<12} {:<24} {:<16} {:<8} {:<5} REGISTERED",
        "ID", "NAME", "DEPARTMENT", "ACTIVE", "FACE"
    );
    for s in students {
        println!(
            "{:<12} {:<24} {:<16} {:<8} {:<5} {}",
            s.student_id,
            s.name,
            s.department.as_deref().unwrap_or(NO_DEPARTMENT),
            if s.is_active { "yes" } else { "no" },
            if s.has_encoding { "yes" } else { "no" },
            s.registration_date
        );
    }
}

pub fn print_attendance(rows: &[AttendanceRow]) {
    if rows.is_empty() {
        println!("No attendance recorded");
        return;
    }
    println!(
        "{:<10} {:<8} {:<12} {:<24} {:<16} {:<7} RECORDED BY",
        "DATE", "TIME", "ID", "NAME", "DEPARTMENT", "STATUS"
    );
    for r in rows {
        println!(
            "{:<10} {:<8} {:<12} {:<24} {:<16} {:<7} {}",
            r.date,
            r.time.format("%H:%M:%S"),
            r.student_id,
            r.name,
            r.department.as_deref().unwrap_or(NO_DEPARTMENT),
            r.status,
            r.recorded_by.as_deref().unwrap_or("")
        );
    }
}

pub fn print_summary(summary: &[DepartmentSummary]) {
    println!(
        "{:<16} {:>8} {:>8} {:>8} {:>8} {:>9}",
        "DEPARTMENT", "STUDENTS", "PRESENT", "ABSENT", "LATE", "PRESENT %"
    );
    for d in summary {
        println!(
            "{:<16} {:>8} {:>8} {:>8} {:>8} {:>9}",
            d.department.as_deref().unwrap_or(NO_DEPARTMENT),
            d.total_students,
            d.present,
            d.absent,
            d.late,
            format_percentage(d.present_percentage())
        );
    }
}

pub fn print_session_summary(summary: &SessionSummary) {
    println!(
        "\nSession finished: {} marked, {} frames read ({} analyzed, {} dropped), {} faces ({} unknown)",
        summary.marked.len(),
        summary.frames_read,
        summary.frames_analyzed,
        summary.frames_dropped,
        summary.faces_seen,
        summary.unknown_faces
    );
    if summary.write_failures > 0 || summary.analyze_errors > 0 {
        println!(
            "{} write failure(s), {} analysis error(s); see log for details",
            summary.write_failures, summary.analyze_errors
        );
    }
}

fn format_percentage(p: Option<f64>) -> String {
    p.map_or_else(|| "n/a".to_string(), |p| format!("{p:.1}"))
}

pub fn report_json(
    from: NaiveDate,
    to: NaiveDate,
    rows: &[AttendanceRow],
    summary: &[DepartmentSummary],
) -> serde_json::Result<String> {
    let departments: Vec<Value> = summary
        .iter()
        .map(|d| {
            json!({
                "department": d.department,
                "total_students": d.total_students,
                "present": d.present,
                "absent": d.absent,
                "late": d.late,
                "present_percentage": d.present_percentage(),
            })
        })
        .collect();

    serde_json::to_string_pretty(&json!({
        "from": from,
        "to": to,
        "attendance": rows,
        "departments": departments,
    }))
}
