//! Job checklist state machine.
//!
//! A job walks its `required_types` in order. The cursor only moves on a
//! PASS for the currently expected type, and only from the index the photo
//! was submitted against, so replays and lost races never double-advance.

use chrono::Utc;

use crate::models::job::{Job, JobStatus};
use crate::models::photo::{PhotoStatus, PhotoType};

impl Job {
    /// `required_types[current_index]`, or `None` once the checklist is done.
    pub fn expected_type(&self) -> Option<&PhotoType> {
        self.required_types.get(self.current_index)
    }

    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }

    /// PENDING → IN_PROGRESS on first contact. Returns whether anything changed.
    pub fn begin(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::InProgress;
        self.updated_at = Utc::now();
        true
    }

    /// Move the cursor past `from_index` if it is still there.
    ///
    /// Reaching the end of the checklist marks the job DONE. Returns `false`
    /// (and leaves the job untouched) when the cursor has already moved.
    pub fn advance_from(&mut self, from_index: usize) -> bool {
        if self.is_done()
            || self.current_index != from_index
            || from_index >= self.required_types.len()
        {
            return false;
        }
        self.current_index += 1;
        self.status = if self.current_index == self.required_types.len() {
            JobStatus::Done
        } else {
            JobStatus::InProgress
        };
        self.updated_at = Utc::now();
        true
    }
}

/// What a finished verdict means for the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// PASS for the expected type at the current cursor.
    Advance,
    /// FAIL: keep the cursor, ask for the same type again.
    Retake,
    /// PASS, but for a different type than the one expected.
    OutOfTurn { expected: PhotoType },
    /// The cursor moved on (or the job finished) after the photo arrived.
    Stale,
}

/// Decide how a verdict for a photo submitted at `submitted_index` affects
/// `job`. Pure; the store applies the cursor move conditionally.
pub fn decide(
    job: &Job,
    submitted_index: usize,
    status: PhotoStatus,
    resolved_type: &PhotoType,
) -> Decision {
    let expected = match job.expected_type() {
        Some(expected) if job.current_index == submitted_index && !job.is_done() => expected,
        _ => return Decision::Stale,
    };

    if status != PhotoStatus::Pass {
        return Decision::Retake;
    }

    if resolved_type != expected {
        return Decision::OutOfTurn {
            expected: expected.clone(),
        };
    }

    Decision::Advance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{NewJob, Thresholds};

    fn job(types: &[&str]) -> Job {
        Job::from_new(NewJob {
            worker_id: "+911234567890".to_string(),
            category: None,
            required_types: types.iter().map(|t| PhotoType::new(t)).collect(),
            thresholds: Thresholds::default(),
        })
    }

    #[test]
    fn test_checklist_walkthrough() {
        let mut job = job(&["A", "B"]);
        assert_eq!(job.status, JobStatus::Pending);

        assert!(job.begin());
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.current_index, 0);
        assert!(!job.begin());

        let a = PhotoType::new("A");
        let b = PhotoType::new("B");

        assert_eq!(decide(&job, 0, PhotoStatus::Pass, &a), Decision::Advance);
        assert!(job.advance_from(0));
        assert_eq!(job.current_index, 1);
        assert_eq!(job.expected_type(), Some(&b));

        assert_eq!(decide(&job, 1, PhotoStatus::Pass, &b), Decision::Advance);
        assert!(job.advance_from(1));
        assert_eq!(job.current_index, 2);
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.expected_type(), None);
    }

    #[test]
    fn test_fail_never_advances() {
        let mut job = job(&["A", "B"]);
        job.begin();
        let a = PhotoType::new("A");
        assert_eq!(decide(&job, 0, PhotoStatus::Fail, &a), Decision::Retake);
        assert_eq!(decide(&job, 0, PhotoStatus::Error, &a), Decision::Retake);
        assert_eq!(job.current_index, 0);
        assert_eq!(job.status, JobStatus::InProgress);
    }

    #[test]
    fn test_out_of_turn_pass_keeps_cursor() {
        let job = job(&["LABEL", "AZIMUTH"]);
        assert_eq!(
            decide(&job, 0, PhotoStatus::Pass, &PhotoType::azimuth()),
            Decision::OutOfTurn {
                expected: PhotoType::label()
            }
        );
    }

    #[test]
    fn test_replayed_advance_is_noop() {
        let mut job = job(&["A", "B", "C"]);
        assert!(job.advance_from(0));
        assert!(!job.advance_from(0));
        assert_eq!(job.current_index, 1);
        assert_eq!(
            decide(&job, 0, PhotoStatus::Pass, &PhotoType::new("A")),
            Decision::Stale
        );
    }

    #[test]
    fn test_done_job_is_stale() {
        let mut job = job(&["A"]);
        assert!(job.advance_from(0));
        assert!(job.is_done());
        assert!(!job.advance_from(1));
        assert_eq!(
            decide(&job, 0, PhotoStatus::Pass, &PhotoType::new("A")),
            Decision::Stale
        );
    }

    #[test]
    fn test_empty_checklist_is_done() {
        let job = job(&[]);
        assert!(job.is_done());
        assert_eq!(job.expected_type(), None);
    }
}
