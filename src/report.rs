use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{BlockTable, Course, CourseId, EvalWindow, DAY_NAMES, DAY_NAMES_SHORT};
use crate::timetable::Timetable;

/// Renders the timetable and the missed-course diagnostics as plain text.
/// Each course entry lists its dates in the slot plus cross-references to
/// the other slots it occupies.
pub fn build_report(
    courses: &BTreeMap<CourseId, Course>,
    timetable: &Timetable,
    window: &EvalWindow,
    blocks: &BlockTable,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Evaluation Timetable");
    let _ = writeln!(
        output,
        "Window {} to {} (both bounds exclusive)",
        window.start, window.end
    );

    for (day_index, day_name) in DAY_NAMES.iter().enumerate() {
        let weekday = day_index as u32 + 1;
        let _ = writeln!(output);
        let _ = writeln!(output, "## {day_name}");

        let mut day_has_courses = false;
        for block in blocks.numbers() {
            let Some(slot) = timetable.slot(weekday, block) else {
                continue;
            };
            if slot.is_empty() {
                continue;
            }
            day_has_courses = true;
            let _ = writeln!(output, "  Block {block}");

            for (course_id, appointments) in slot {
                let Some(course) = courses.get(course_id) else {
                    continue;
                };
                let _ = writeln!(output, "    {}, {}", course.name, course.lecturer_line());
                for appointment in appointments {
                    let _ = writeln!(output, "      {}", appointment.start.format("%d.%m."));
                }

                for &(other_day, other_block) in timetable.occurrences_for(*course_id) {
                    if other_day == weekday && other_block == block {
                        continue;
                    }
                    let day_short = DAY_NAMES_SHORT
                        .get(other_day as usize - 1)
                        .copied()
                        .unwrap_or("?");
                    let _ = writeln!(output, "      also {day_short}/{other_block}");
                    if let Some(other_dates) = timetable
                        .slot(other_day, other_block)
                        .and_then(|slot| slot.get(course_id))
                    {
                        for appointment in other_dates {
                            let _ =
                                writeln!(output, "        {}", appointment.start.format("%d.%m."));
                        }
                    }
                }
            }
        }
        if !day_has_courses {
            let _ = writeln!(output, "  No courses.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Courses Without Appointments");
    if timetable.missed.is_empty() {
        let _ = writeln!(
            output,
            "Every course has at least one appointment in the window."
        );
    } else {
        for course_id in &timetable.missed {
            let Some(course) = courses.get(course_id) else {
                continue;
            };
            let _ = writeln!(
                output,
                "- no appointment in the evaluation window for '{}' (no. {}, {})",
                course.name,
                course.number,
                course.lecturer_line()
            );
        }
    }

    output
}
