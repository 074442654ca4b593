use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::Datelike;

use crate::models::{Appointment, BlockTable, Course, CourseId, EvalWindow};

pub const WEEKDAY_COUNT: usize = 5;

/// Courses meeting in one (weekday, block) cell, with their appointments in
/// start order.
pub type Slot = BTreeMap<CourseId, Vec<Appointment>>;

/// The assembled grid. Weekdays run 1 (Monday) to 5 (Friday); block numbers
/// come from the block table the grid was built with.
#[derive(Debug, Clone, PartialEq)]
pub struct Timetable {
    slots: Vec<Vec<Slot>>,
    block_numbers: Vec<u8>,
    /// Distinct (weekday, block) pairs per course, in first-seen order.
    pub occurrences: BTreeMap<CourseId, Vec<(u32, u8)>>,
    /// Courses with no appointment inside the evaluation window, in
    /// ascending id order.
    pub missed: Vec<CourseId>,
}

impl Timetable {
    fn new(block_numbers: Vec<u8>) -> Self {
        let slots = vec![vec![Slot::new(); block_numbers.len()]; WEEKDAY_COUNT];
        Timetable {
            slots,
            block_numbers,
            occurrences: BTreeMap::new(),
            missed: Vec::new(),
        }
    }

    fn block_index(&self, block: u8) -> Option<usize> {
        self.block_numbers.iter().position(|&number| number == block)
    }

    pub fn slot(&self, weekday: u32, block: u8) -> Option<&Slot> {
        let day = weekday.checked_sub(1)? as usize;
        let index = self.block_index(block)?;
        self.slots.get(day)?.get(index)
    }

    /// Largest number of courses meeting in `block` on any weekday.
    pub fn max_concurrent(&self, block: u8) -> usize {
        let Some(index) = self.block_index(block) else {
            return 0;
        };
        self.slots
            .iter()
            .map(|day| day[index].len())
            .max()
            .unwrap_or(0)
    }

    pub fn occurrences_for(&self, course_id: CourseId) -> &[(u32, u8)] {
        self.occurrences
            .get(&course_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Arranges every active appointment into its (weekday, block) cell.
///
/// Courses are visited in ascending id order and appointments in start
/// order, so the grid, the per-slot appointment lists, and the occurrence
/// pairs all come out in the same order on every run.
pub fn build_timetable(
    courses: &BTreeMap<CourseId, Course>,
    window: &EvalWindow,
    blocks: &BlockTable,
) -> Result<Timetable> {
    let mut timetable = Timetable::new(blocks.numbers().collect());

    for (&course_id, course) in courses {
        let mut found = false;
        for appointment in &course.appointments {
            if !window.contains(appointment.start) {
                continue;
            }
            found = true;

            let weekday = appointment.start.weekday().number_from_monday();
            if weekday as usize > WEEKDAY_COUNT {
                bail!(
                    "appointment on {} for course '{}' (no. {}) falls outside the Monday-Friday grid",
                    appointment.start.date(),
                    course.name,
                    course.number
                );
            }
            let block = blocks.classify(appointment.start.time()).with_context(|| {
                format!(
                    "no timetable block covers {} (course '{}', no. {})",
                    appointment.start, course.name, course.number
                )
            })?;

            let day = (weekday - 1) as usize;
            let index = timetable
                .block_index(block)
                .context("block table returned an unknown block number")?;
            timetable.slots[day][index]
                .entry(course_id)
                .or_default()
                .push(appointment.clone());

            let pairs = timetable.occurrences.entry(course_id).or_default();
            if !pairs.contains(&(weekday, block)) {
                pairs.push((weekday, block));
            }
        }

        if !found {
            timetable.missed.push(course_id);
        }
    }

    Ok(timetable)
}
