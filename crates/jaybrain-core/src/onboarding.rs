//! Onboarding State
//!
//! Single-row progress tracker for the first-run walkthrough. Completing a
//! step twice is a structured conflict, not an error.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::storage::{now_iso, Result, Store, StoreError};

/// Steps in walkthrough order
pub const ONBOARDING_STEPS: &[&str] = &[
    "profile",
    "life_domains",
    "first_memory",
    "first_task",
    "forge_subject",
    "notifications",
];

/// The onboarding row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub stage: String,
    pub completed_steps: Vec<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub remaining_steps: Vec<String>,
}

/// Step-completion outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepResult {
    Completed { state: OnboardingState },
    AlreadyCompleted { step: String },
    UnknownStep { step: String },
}

impl Store {
    /// Read (seeding on first access) the onboarding state.
    pub fn onboarding_status(&self) -> Result<OnboardingState> {
        {
            let conn = self.write()?;
            conn.execute(
                "INSERT OR IGNORE INTO onboarding_state (id, stage, started_at) VALUES (1, 'new', ?1)",
                [now_iso()],
            )?;
        }
        let conn = self.read()?;
        let row = conn
            .query_row(
                "SELECT stage, completed_steps, started_at, completed_at FROM onboarding_state WHERE id = 1",
                [],
                |row| {
                    let steps: String = row.get(1)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        serde_json::from_str::<Vec<String>>(&steps).unwrap_or_default(),
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound("onboarding_state".into()))?;

        let (stage, completed_steps, started_at, completed_at) = row;
        let remaining_steps = ONBOARDING_STEPS
            .iter()
            .filter(|s| !completed_steps.iter().any(|c| c == *s))
            .map(|s| s.to_string())
            .collect();
        Ok(OnboardingState {
            stage,
            completed_steps,
            started_at,
            completed_at,
            remaining_steps,
        })
    }

    /// Mark a step complete. Finishing the last step flips the stage to
    /// `complete`.
    pub fn onboarding_complete_step(&self, step: &str) -> Result<StepResult> {
        if !ONBOARDING_STEPS.contains(&step) {
            return Ok(StepResult::UnknownStep {
                step: step.to_string(),
            });
        }
        let state = self.onboarding_status()?;
        if state.completed_steps.iter().any(|s| s == step) {
            return Ok(StepResult::AlreadyCompleted {
                step: step.to_string(),
            });
        }

        let mut completed = state.completed_steps.clone();
        completed.push(step.to_string());
        let all_done = ONBOARDING_STEPS
            .iter()
            .all(|s| completed.iter().any(|c| c == *s));

        {
            let conn = self.write()?;
            conn.execute(
                "UPDATE onboarding_state
                 SET completed_steps = ?1, stage = ?2, completed_at = ?3
                 WHERE id = 1",
                params![
                    serde_json::to_string(&completed).unwrap_or_else(|_| "[]".into()),
                    if all_done { "complete" } else { "in_progress" },
                    if all_done { Some(now_iso()) } else { None },
                ],
            )?;
        }
        Ok(StepResult::Completed {
            state: self.onboarding_status()?,
        })
    }
}
