use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook};

use crate::aliases::AliasTable;
use crate::manifest::ManifestRow;
use crate::models::{Appointment, BlockTable, Course, CourseId, DAY_NAMES};
use crate::timetable::Timetable;

const MISMATCH_COLOR: u32 = 0xFF0000;
const PENDING_COLOR: u32 = 0xFFFFE0;

struct SheetFormats {
    header: Format,
    block_label: Format,
    block_top: Format,
    cell: Format,
    text: Format,
    mismatch: Format,
    pending: Format,
}

fn create_formats() -> SheetFormats {
    let header = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);

    // A medium top edge delimits the block bands; thin borders delimit the
    // weekday columns.
    let block_label = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_border_top(FormatBorder::Medium);

    let block_top = Format::new()
        .set_border(FormatBorder::Thin)
        .set_border_top(FormatBorder::Medium);

    let cell = Format::new().set_border(FormatBorder::Thin);

    let text = Format::new();

    let mismatch = Format::new().set_background_color(MISMATCH_COLOR);

    let pending = Format::new().set_background_color(PENDING_COLOR);

    SheetFormats {
        header,
        block_label,
        block_top,
        cell,
        text,
        mismatch,
        pending,
    }
}

/// Builds the workbook: the weekday × block timetable sheet and the
/// manifest comparison sheet. Returns the XLSX bytes; writing the file is
/// the caller's concern, behind its overwrite prompt.
pub fn render_workbook(
    courses: &BTreeMap<CourseId, Course>,
    timetable: &Timetable,
    blocks: &BlockTable,
    manifest: &[ManifestRow],
    lecturer_aliases: &AliasTable,
    room_aliases: &AliasTable,
) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let formats = create_formats();

    add_timetable_sheet(
        &mut workbook,
        courses,
        timetable,
        blocks,
        manifest,
        lecturer_aliases,
        room_aliases,
        &formats,
    )?;
    add_courses_sheet(&mut workbook, courses, manifest, &formats)?;

    let buffer = workbook
        .save_to_buffer()
        .context("failed to build workbook")?;
    Ok(buffer)
}

#[allow(clippy::too_many_arguments)]
fn add_timetable_sheet(
    workbook: &mut Workbook,
    courses: &BTreeMap<CourseId, Course>,
    timetable: &Timetable,
    blocks: &BlockTable,
    manifest: &[ManifestRow],
    lecturer_aliases: &AliasTable,
    room_aliases: &AliasTable,
    formats: &SheetFormats,
) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Timetable")?;

    sheet.write_with_format(0, 0, "", &formats.header)?;
    sheet.set_column_width(0, 16)?;
    for (day_index, day_name) in DAY_NAMES.iter().enumerate() {
        let col = day_index as u16 + 1;
        sheet.write_with_format(0, col, *day_name, &formats.header)?;
        sheet.set_column_width(col, 40)?;
    }

    let overrides: BTreeMap<i64, &ManifestRow> =
        manifest.iter().map(|row| (row.no, row)).collect();

    let mut row = 1u32;
    for block in blocks.blocks() {
        // The band is as tall as the fullest slot of this block across the
        // week, so concurrent courses each get their own row.
        let band_height = timetable.max_concurrent(block.number).max(1) as u32;

        let label = format!("Block {} ({})", block.number, block.start.format("%H:%M"));
        sheet.write_with_format(row, 0, label, &formats.block_label)?;
        for extra in 1..band_height {
            sheet.write_with_format(row + extra, 0, "", &formats.cell)?;
        }

        for day_index in 0..DAY_NAMES.len() {
            let weekday = day_index as u32 + 1;
            let col = day_index as u16 + 1;

            let entries: Vec<String> = match timetable.slot(weekday, block.number) {
                Some(slot) => slot
                    .iter()
                    .filter_map(|(course_id, appointments)| {
                        let course = courses.get(course_id)?;
                        Some(slot_text(
                            course,
                            appointments,
                            overrides.get(&course.number).copied(),
                            lecturer_aliases,
                            room_aliases,
                        ))
                    })
                    .collect(),
                None => Vec::new(),
            };

            for offset in 0..band_height {
                let format = if offset == 0 {
                    &formats.block_top
                } else {
                    &formats.cell
                };
                let text = entries
                    .get(offset as usize)
                    .map(String::as_str)
                    .unwrap_or("");
                sheet.write_with_format(row + offset, col, text, format)?;
            }
        }

        row += band_height;
    }

    // Close the last band with a medium edge.
    for col in 0..=DAY_NAMES.len() as u16 {
        sheet.write_with_format(row, col, "", &formats.block_top)?;
    }

    Ok(())
}

fn slot_text(
    course: &Course,
    appointments: &[Appointment],
    manifest_row: Option<&ManifestRow>,
    lecturer_aliases: &AliasTable,
    room_aliases: &AliasTable,
) -> String {
    let name = match manifest_row {
        Some(row) => row.display_name(&course.name),
        None => course.name.clone(),
    };

    let lecturers: Vec<&str> = course
        .lecturers
        .iter()
        .map(|lecturer| lecturer_aliases.resolve(lecturer))
        .collect();

    let mut rooms: Vec<&str> = Vec::new();
    for appointment in appointments {
        let room = room_aliases.resolve(&appointment.room);
        if !rooms.contains(&room) {
            rooms.push(room);
        }
    }

    format!("{} ({}; {})", name, lecturers.join(", "), rooms.join(", "))
}

fn add_courses_sheet(
    workbook: &mut Workbook,
    courses: &BTreeMap<CourseId, Course>,
    manifest: &[ManifestRow],
    formats: &SheetFormats,
) -> Result<()> {
    let sheet = workbook.add_worksheet();
    sheet.set_name("Courses")?;

    let headers = ["No.", "Name", "Category", "Status", "Fetched Name"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_with_format(0, col as u16, *header, &formats.header)?;
    }
    sheet.set_column_width(0, 10)?;
    sheet.set_column_width(1, 40)?;
    sheet.set_column_width(3, 14)?;
    sheet.set_column_width(4, 40)?;

    let by_number: BTreeMap<i64, &Course> =
        courses.values().map(|course| (course.number, course)).collect();

    for (index, row) in manifest.iter().enumerate() {
        let sheet_row = index as u32 + 1;
        let fetched = by_number.get(&row.no).copied();

        let (status, format) = comparison_status(row, fetched, formats);

        sheet.write_with_format(sheet_row, 0, row.no as f64, format)?;
        sheet.write_with_format(sheet_row, 1, row.name.as_str(), format)?;
        sheet.write_with_format(sheet_row, 2, row.category.as_str(), format)?;
        sheet.write_with_format(sheet_row, 3, status, format)?;
        let fetched_name = fetched.map(|course| course.name.as_str()).unwrap_or("");
        sheet.write_with_format(sheet_row, 4, fetched_name, format)?;
    }

    Ok(())
}

fn comparison_status<'a>(
    row: &ManifestRow,
    fetched: Option<&Course>,
    formats: &'a SheetFormats,
) -> (&'static str, &'a Format) {
    if row.excluded() {
        return ("excluded", &formats.text);
    }
    match fetched {
        None => ("not fetched", &formats.pending),
        Some(course) => {
            let expected = row.name.trim();
            if !expected.is_empty() && expected != course.name {
                ("name mismatch", &formats.mismatch)
            } else {
                ("found", &formats.text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvalWindow;
    use crate::timetable::build_timetable;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn dt(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn appointment(start: NaiveDateTime) -> Appointment {
        Appointment {
            start,
            end: start + Duration::minutes(90),
            room: "Audimax".to_string(),
        }
    }

    fn manifest_row(no: i64, name: &str, short_name: &str) -> ManifestRow {
        ManifestRow {
            no,
            name: name.to_string(),
            short_name: short_name.to_string(),
            category: "compulsory".to_string(),
            exercise: String::new(),
            lab: String::new(),
            exclude: String::new(),
        }
    }

    fn sample() -> (BTreeMap<CourseId, Course>, Timetable, BlockTable) {
        let courses: BTreeMap<CourseId, Course> = [Course {
            id: 1,
            number: 4010031,
            name: "Experimental Physics".to_string(),
            lecturers: vec!["Miller".to_string()],
            appointments: vec![appointment(dt(2014, 12, 1, 9, 45))],
        }]
        .into_iter()
        .map(|course| (course.id, course))
        .collect();

        let window = EvalWindow {
            start: dt(2014, 12, 1, 0, 0),
            end: dt(2014, 12, 12, 23, 59),
        };
        let blocks = BlockTable::standard().unwrap();
        let timetable = build_timetable(&courses, &window, &blocks).unwrap();
        (courses, timetable, blocks)
    }

    #[test]
    fn workbook_bytes_are_a_zip_archive() {
        let (courses, timetable, blocks) = sample();
        let manifest = vec![manifest_row(4010031, "Experimental Physics", "ExPhys")];

        let bytes = render_workbook(
            &courses,
            &timetable,
            &blocks,
            &manifest,
            &AliasTable::default(),
            &AliasTable::default(),
        )
        .unwrap();

        assert!(bytes.len() > 100);
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn workbook_renders_without_manifest_rows() {
        let (courses, timetable, blocks) = sample();

        let bytes = render_workbook(
            &courses,
            &timetable,
            &blocks,
            &[],
            &AliasTable::default(),
            &AliasTable::default(),
        )
        .unwrap();
        assert_eq!(&bytes[0..2], b"PK");
    }

    #[test]
    fn slot_text_applies_overrides_and_aliases() {
        let (courses, _, _) = sample();
        let course = courses.get(&1).unwrap();
        let row = manifest_row(4010031, "Experimental Physics", "ExPhys");

        let lecturers =
            AliasTable::from_reader("name,alias\nMiller,Prof. Miller\n".as_bytes()).unwrap();
        let rooms =
            AliasTable::from_reader("name,alias\nAudimax,Audimax (30.95)\n".as_bytes()).unwrap();

        let text = slot_text(
            course,
            &course.appointments,
            Some(&row),
            &lecturers,
            &rooms,
        );
        assert_eq!(text, "ExPhys (Prof. Miller; Audimax (30.95))");
    }

    #[test]
    fn comparison_flags_mismatch_and_pending() {
        let (courses, _, _) = sample();
        let formats = create_formats();
        let course = courses.get(&1).unwrap();

        let matching = manifest_row(4010031, "Experimental Physics", "");
        assert_eq!(
            comparison_status(&matching, Some(course), &formats).0,
            "found"
        );

        let mismatching = manifest_row(4010031, "Something Else", "");
        assert_eq!(
            comparison_status(&mismatching, Some(course), &formats).0,
            "name mismatch"
        );

        let pending = manifest_row(4010999, "Not Fetched", "");
        assert_eq!(comparison_status(&pending, None, &formats).0, "not fetched");

        let mut excluded = manifest_row(4010031, "Experimental Physics", "");
        excluded.exclude = "x".to_string();
        assert_eq!(
            comparison_status(&excluded, Some(course), &formats).0,
            "excluded"
        );
    }
}
