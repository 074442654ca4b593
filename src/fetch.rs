use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::models::{Appointment, Course, CourseId};

/// The API writes offsets as `+HH:MM`, but `%z` wants `+HHMM`; all colons
/// are stripped from the raw string before parsing.
const API_DATETIME_FORMAT: &str = "%Y-%m-%dT%H%M%S%z";

#[derive(Debug, Deserialize)]
struct CourseRecord {
    id: CourseId,
    no: i64,
    name: String,
    lecturer: String,
    dates: Vec<DateRecord>,
}

#[derive(Debug, Deserialize)]
struct DateRecord {
    start_time: String,
    end_time: String,
    room: String,
}

/// Parses an API timestamp into a naive local instant. The offset is
/// dropped on purpose; the timetable works in wall-clock time.
pub fn parse_api_datetime(raw: &str) -> Result<NaiveDateTime> {
    let stripped: String = raw.chars().filter(|&c| c != ':').collect();
    let parsed = DateTime::parse_from_str(&stripped, API_DATETIME_FORMAT)
        .with_context(|| format!("invalid datetime '{raw}'"))?;
    Ok(parsed.naive_local())
}

fn event_url(base_url: &str, term_id: i64, course_number: i64) -> String {
    format!(
        "{}/terms/{}/events.json?type=detail&no={}",
        base_url.trim_end_matches('/'),
        term_id,
        course_number
    )
}

fn cache_file(cache_dir: &Path, course_number: i64) -> PathBuf {
    cache_dir.join(format!("{course_number}.json"))
}

async fn request_events(client: &reqwest::Client, url: &str) -> reqwest::Result<String> {
    client.get(url).send().await?.error_for_status()?.text().await
}

/// Downloads every course sequentially. Failures are printed and skipped so
/// the run can fall back to whatever cache exists; nothing is retried.
pub async fn fetch_courses(
    client: &reqwest::Client,
    base_url: &str,
    term_id: i64,
    course_numbers: &[i64],
    cache_dir: &Path,
) -> Result<()> {
    for &number in course_numbers {
        fetch_course(client, base_url, term_id, number, cache_dir).await?;
    }
    Ok(())
}

pub async fn fetch_course(
    client: &reqwest::Client,
    base_url: &str,
    term_id: i64,
    course_number: i64,
    cache_dir: &Path,
) -> Result<()> {
    let target = cache_file(cache_dir, course_number);
    if target.exists() {
        println!("course '{course_number}' already cached, skipping fetch.");
        return Ok(());
    }

    println!("fetching course '{course_number}'.");
    let url = event_url(base_url, term_id, course_number);

    let body = match request_events(client, &url).await {
        Ok(body) => body,
        Err(err) if err.is_status() => {
            let status = err
                .status()
                .map(|status| status.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            eprintln!("HTTP error '{status}' while fetching course '{course_number}'.");
            return Ok(());
        }
        Err(err) if err.is_connect() || err.is_timeout() => {
            eprintln!("connection error while fetching course '{course_number}': {err}");
            return Ok(());
        }
        Err(err) => {
            eprintln!("unexpected error while fetching course '{course_number}': {err}");
            return Ok(());
        }
    };

    let data: serde_json::Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(err) => {
            eprintln!("error parsing response for course '{course_number}' as JSON: {err}");
            return Ok(());
        }
    };

    fs::create_dir_all(cache_dir)
        .with_context(|| format!("failed to create {}", cache_dir.display()))?;
    let pretty = serde_json::to_string_pretty(&data)?;
    fs::write(&target, pretty).with_context(|| format!("failed to write {}", target.display()))?;
    Ok(())
}

/// Loads every cached course file, keyed by course id. Files are visited in
/// sorted filename order so repeated runs see the same course sequence.
pub fn load_courses(cache_dir: &Path) -> Result<BTreeMap<CourseId, Course>> {
    let mut courses = BTreeMap::new();
    if !cache_dir.exists() {
        return Ok(courses);
    }

    let mut paths = Vec::new();
    for entry in
        fs::read_dir(cache_dir).with_context(|| format!("failed to read {}", cache_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        let body = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let records: Vec<CourseRecord> = serde_json::from_str(&body)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        if records.len() > 1 {
            println!(
                "{} holds {} objects instead of one; importing them all.",
                path.display(),
                records.len()
            );
        }
        for record in records {
            let course = course_from_record(record)
                .with_context(|| format!("invalid course data in {}", path.display()))?;
            courses.insert(course.id, course);
        }
    }

    Ok(courses)
}

fn course_from_record(record: CourseRecord) -> Result<Course> {
    let mut appointments = Vec::with_capacity(record.dates.len());
    for date in &record.dates {
        appointments.push(Appointment {
            start: parse_api_datetime(&date.start_time)?,
            end: parse_api_datetime(&date.end_time)?,
            room: date.room.clone(),
        });
    }
    appointments.sort_by_key(|appointment| appointment.start);

    let lecturers = record
        .lecturer
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(Course {
        id: record.id,
        number: record.no,
        name: record.name,
        lecturers,
        appointments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn datetime_parse_strips_colons_and_drops_offset() {
        let parsed = parse_api_datetime("2014-06-11T19:00:00+02:00").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2014, 6, 11)
                .unwrap()
                .and_hms_opt(19, 0, 0)
                .unwrap()
        );

        // A different offset must not shift the wall-clock time.
        let other = parse_api_datetime("2014-06-11T19:00:00+05:00").unwrap();
        assert_eq!(other.hour(), 19);
    }

    #[test]
    fn datetime_parse_rejects_garbage() {
        assert!(parse_api_datetime("2014-06-11").is_err());
        assert!(parse_api_datetime("not a date").is_err());
    }

    #[test]
    fn event_url_is_term_and_number_parameterized() {
        assert_eq!(
            event_url("http://www.kithub.de/api/", 7895, 4010031),
            "http://www.kithub.de/api/terms/7895/events.json?type=detail&no=4010031"
        );
    }

    #[test]
    fn record_parses_lecturers_and_sorts_dates() {
        let record: CourseRecord = serde_json::from_str(
            r#"{
                "id": 42,
                "no": 4010031,
                "name": "Experimental Physics",
                "lecturer": "Miller, Anna Schmidt",
                "dates": [
                    {"start_time": "2014-12-08T09:45:00+01:00", "end_time": "2014-12-08T11:15:00+01:00", "room": "Audimax"},
                    {"start_time": "2014-12-01T09:45:00+01:00", "end_time": "2014-12-01T11:15:00+01:00", "room": "Audimax"}
                ]
            }"#,
        )
        .unwrap();

        let course = course_from_record(record).unwrap();
        assert_eq!(course.id, 42);
        assert_eq!(course.number, 4010031);
        assert_eq!(course.lecturers, vec!["Miller", "Anna Schmidt"]);
        assert_eq!(course.appointments.len(), 2);
        assert!(course.appointments[0].start < course.appointments[1].start);
    }

    #[test]
    fn cache_files_are_named_by_course_number() {
        let path = cache_file(Path::new("courses"), 4010031);
        assert_eq!(path, Path::new("courses/4010031.json"));
    }
}
