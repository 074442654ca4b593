use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

mod aliases;
mod fetch;
mod manifest;
mod models;
mod report;
mod timetable;
mod xlsx;

use models::{BlockTable, Course, CourseId, EvalWindow};

#[derive(Parser)]
#[command(name = "eva-timetable")]
#[command(about = "Course evaluation timetable builder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download course data into the local cache
    Fetch {
        /// Term id of the semester to evaluate
        #[arg(long)]
        term: i64,
        #[arg(long, default_value = "courses.csv")]
        manifest: PathBuf,
        #[arg(long, default_value = "courses")]
        cache_dir: PathBuf,
        #[arg(long, default_value = "http://www.kithub.de/api")]
        base_url: String,
    },
    /// Print the assembled timetable to the console
    Show {
        #[arg(long, default_value = "courses.csv")]
        manifest: PathBuf,
        #[arg(long, default_value = "courses")]
        cache_dir: PathBuf,
        /// Window start, e.g. 2014-12-01T00:00:00+02:00
        #[arg(long)]
        from: String,
        /// Window end, e.g. 2014-12-12T23:59:59+02:00
        #[arg(long)]
        to: String,
    },
    /// Write the timetable spreadsheet
    Render {
        #[arg(long, default_value = "courses.csv")]
        manifest: PathBuf,
        #[arg(long, default_value = "courses")]
        cache_dir: PathBuf,
        /// Window start, e.g. 2014-12-01T00:00:00+02:00
        #[arg(long)]
        from: String,
        /// Window end, e.g. 2014-12-12T23:59:59+02:00
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "timetable.xlsx")]
        out: PathBuf,
        #[arg(long, default_value = "lecturers.csv")]
        lecturers: PathBuf,
        #[arg(long, default_value = "rooms.csv")]
        rooms: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            term,
            manifest,
            cache_dir,
            base_url,
        } => {
            let rows = manifest::load_manifest(&manifest)?;
            let numbers = manifest::included_numbers(&rows);
            if numbers.is_empty() {
                println!("No courses selected in {}.", manifest.display());
                return Ok(());
            }
            let client = reqwest::Client::new();
            fetch::fetch_courses(&client, &base_url, term, &numbers, &cache_dir).await?;
            println!("Cache ready under {}.", cache_dir.display());
        }
        Commands::Show {
            manifest,
            cache_dir,
            from,
            to,
        } => {
            let rows = manifest::load_manifest(&manifest)?;
            let courses = load_selected_courses(&cache_dir, &rows)?;
            let window = parse_window(&from, &to)?;
            let blocks = BlockTable::standard()?;
            let timetable = timetable::build_timetable(&courses, &window, &blocks)?;
            print!("{}", report::build_report(&courses, &timetable, &window, &blocks));
        }
        Commands::Render {
            manifest,
            cache_dir,
            from,
            to,
            out,
            lecturers,
            rooms,
        } => {
            let rows = manifest::load_manifest(&manifest)?;
            let courses = load_selected_courses(&cache_dir, &rows)?;
            let window = parse_window(&from, &to)?;
            let blocks = BlockTable::standard()?;
            let timetable = timetable::build_timetable(&courses, &window, &blocks)?;

            for course in timetable.missed.iter().filter_map(|id| courses.get(id)) {
                eprintln!(
                    "no appointment in the evaluation window for '{}' (no. {}, {})",
                    course.name,
                    course.number,
                    course.lecturer_line()
                );
            }

            let lecturer_aliases = sync_aliases(
                &lecturers,
                courses
                    .values()
                    .flat_map(|course| course.lecturers.iter().map(String::as_str)),
            )?;
            let room_aliases = sync_aliases(
                &rooms,
                courses.values().flat_map(|course| {
                    course
                        .appointments
                        .iter()
                        .map(|appointment| appointment.room.as_str())
                }),
            )?;

            if out.exists() && !confirm_overwrite(&out)? {
                bail!("not overwriting {}", out.display());
            }
            let buffer = xlsx::render_workbook(
                &courses,
                &timetable,
                &blocks,
                &rows,
                &lecturer_aliases,
                &room_aliases,
            )?;
            std::fs::write(&out, buffer)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Timetable written to {}.", out.display());
        }
    }

    Ok(())
}

fn parse_window(from: &str, to: &str) -> anyhow::Result<EvalWindow> {
    Ok(EvalWindow {
        start: fetch::parse_api_datetime(from).context("invalid --from value")?,
        end: fetch::parse_api_datetime(to).context("invalid --to value")?,
    })
}

fn load_selected_courses(
    cache_dir: &Path,
    rows: &[manifest::ManifestRow],
) -> anyhow::Result<BTreeMap<CourseId, Course>> {
    let mut courses = fetch::load_courses(cache_dir)?;
    let selected: BTreeSet<i64> = manifest::included_numbers(rows).into_iter().collect();
    courses.retain(|_, course| selected.contains(&course.number));
    Ok(courses)
}

fn sync_aliases<'a, I>(path: &Path, names: I) -> anyhow::Result<aliases::AliasTable>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut table = aliases::AliasTable::load(path)?;
    let added = table.merge(names);
    if added > 0 {
        table.save(path)?;
        println!("Added {added} new entries to {}.", path.display());
    }
    Ok(table)
}

fn confirm_overwrite(path: &Path) -> anyhow::Result<bool> {
    print!("{} already exists. Overwrite? [y/N] ", path.display());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}
