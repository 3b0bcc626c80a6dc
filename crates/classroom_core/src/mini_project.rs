//! crates/classroom_core/src/mini_project.rs
//!
//! The weekly project-history manager and the mini-project task lifecycle.
//!
//! Every operation here mutates a `MiniProjectRecord` value in memory and
//! performs no I/O. Callers persist the result through a
//! `MiniProjectRepository` (see `workflow::update_versioned`).

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::domain::{
    CompletedTask, Language, MiniProjectRecord, ProjectRecommendation, TaskStatus, WeekEntry,
};
use crate::ports::{PortError, PortResult};
use crate::week;

/// Week key used when neither the caller nor the record names one.
pub const FALLBACK_WEEK_NUMBER: u32 = 1;

/// Normalized form used to compare project titles.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl MiniProjectRecord {
    //=====================================================================================
    // Generation Flag
    //=====================================================================================

    pub fn enable_generation(&mut self, now: DateTime<Utc>) {
        self.generation_enabled = true;
        self.last_generation_date = Some(now);
    }

    pub fn disable_generation(&mut self) {
        self.generation_enabled = false;
    }

    //=====================================================================================
    // Weekly History
    //=====================================================================================

    pub fn week(&self, week_number: u32) -> Option<&WeekEntry> {
        self.weekly_project_history
            .iter()
            .find(|w| w.week_number == week_number)
    }

    fn week_mut(&mut self, week_number: u32) -> Option<&mut WeekEntry> {
        self.weekly_project_history
            .iter_mut()
            .find(|w| w.week_number == week_number)
    }

    pub fn current_week(&self) -> Option<&WeekEntry> {
        self.current_week_number.and_then(|n| self.week(n))
    }

    /// Files `recommendations` under a week, appending to the entry if it
    /// exists and creating it otherwise. Returns the target week number.
    ///
    /// The target is `week_number`, else the current week, else
    /// `FALLBACK_WEEK_NUMBER`. A new entry defaults its start to `now` and its
    /// end to seven days after the start, and moves the current-week pointer
    /// forward to it. Titles are not deduplicated here.
    pub fn add_weekly_generated_projects(
        &mut self,
        recommendations: Vec<ProjectRecommendation>,
        week_number: Option<u32>,
        week_start: Option<DateTime<Utc>>,
        week_end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> u32 {
        let target = week_number
            .or(self.current_week_number)
            .unwrap_or(FALLBACK_WEEK_NUMBER);

        let mut java = Vec::new();
        let mut python = Vec::new();
        for mut rec in recommendations {
            rec.week_number = Some(target);
            match rec.language {
                Language::Java => java.push(rec),
                Language::Python => python.push(rec),
            }
        }

        match self.week_mut(target) {
            Some(entry) => {
                entry.java_projects.extend(java);
                entry.python_projects.extend(python);
            }
            None => {
                let start = week_start.unwrap_or(now);
                let end = week_end.unwrap_or(start + week::week_length());
                self.weekly_project_history.push(WeekEntry {
                    week_number: target,
                    week_start_date: start,
                    week_end_date: end,
                    java_projects: java,
                    python_projects: python,
                    generated_at: now,
                });
                // The pointer never moves backwards.
                self.current_week_number = Some(match self.current_week_number {
                    Some(current) => current.max(target),
                    None => target,
                });
            }
        }

        self.last_generation_date = Some(now);
        target
    }

    /// Recommendations in the current week for `language`; empty when the
    /// current week has no entry.
    pub fn current_week_projects(&self, language: Language) -> &[ProjectRecommendation] {
        self.current_week()
            .map(|w| w.projects(language))
            .unwrap_or(&[])
    }

    /// Same as [`MiniProjectRecord::current_week_projects`].
    pub fn projects_by_language(&self, language: Language) -> &[ProjectRecommendation] {
        self.current_week_projects(language)
    }

    /// Empties one language in the current week. No-op without a current entry.
    pub fn clear_projects_by_language(&mut self, language: Language) {
        if let Some(current) = self.current_week_number {
            if let Some(entry) = self.week_mut(current) {
                entry.projects_mut(language).clear();
            }
        }
    }

    /// One language of a historical week, or java followed by python when
    /// `language` is `None`.
    pub fn projects_by_week(
        &self,
        week_number: u32,
        language: Option<Language>,
    ) -> Vec<ProjectRecommendation> {
        let Some(entry) = self.week(week_number) else {
            return Vec::new();
        };
        match language {
            Some(language) => entry.projects(language).to_vec(),
            None => entry
                .java_projects
                .iter()
                .chain(entry.python_projects.iter())
                .cloned()
                .collect(),
        }
    }

    /// Normalized titles of every recommendation in history, both languages.
    pub fn known_titles(&self) -> HashSet<String> {
        self.weekly_project_history
            .iter()
            .flat_map(|w| w.java_projects.iter().chain(w.python_projects.iter()))
            .map(|p| normalize_title(&p.title))
            .collect()
    }

    /// Drops recommendations whose title already appears in history under any
    /// language, or earlier in the same batch.
    pub fn dedupe_recommendations(
        &self,
        recommendations: Vec<ProjectRecommendation>,
    ) -> Vec<ProjectRecommendation> {
        let mut seen = self.known_titles();
        recommendations
            .into_iter()
            .filter(|rec| seen.insert(normalize_title(&rec.title)))
            .collect()
    }

    /// Keeps the newest `keep` weeks by week number and never evicts the
    /// current week. `keep == 0` disables eviction. Returns how many entries
    /// were removed.
    pub fn apply_retention(&mut self, keep: usize) -> usize {
        if keep == 0 || self.weekly_project_history.len() <= keep {
            return 0;
        }

        let mut numbers: Vec<u32> = self
            .weekly_project_history
            .iter()
            .map(|w| w.week_number)
            .collect();
        numbers.sort_unstable_by(|a, b| b.cmp(a));
        let mut retained: HashSet<u32> = numbers.into_iter().take(keep).collect();
        if let Some(current) = self.current_week_number {
            retained.insert(current);
        }

        let before = self.weekly_project_history.len();
        self.weekly_project_history
            .retain(|w| retained.contains(&w.week_number));
        before - self.weekly_project_history.len()
    }

    /// Moves recommendations from the old flat shape into week entries.
    /// Returns `true` if anything was migrated; running it again is a no-op.
    ///
    /// Entries created here are dated from the recommendations they hold,
    /// and `last_generation_date` is left alone since nothing was generated.
    pub fn migrate_legacy(&mut self) -> bool {
        if self.legacy_recommendations.is_empty() {
            return false;
        }

        let legacy = std::mem::take(&mut self.legacy_recommendations);
        let mut by_week: Vec<(u32, Vec<ProjectRecommendation>)> = Vec::new();
        for rec in legacy {
            let target = rec
                .week_number
                .or(self.current_week_number)
                .unwrap_or(FALLBACK_WEEK_NUMBER);
            match by_week.iter_mut().find(|(n, _)| *n == target) {
                Some((_, recs)) => recs.push(rec),
                None => by_week.push((target, vec![rec])),
            }
        }

        let last_generation_date = self.last_generation_date;
        for (week_number, recs) in by_week {
            let Some(earliest) = recs.iter().map(|r| r.generated_at).min() else {
                continue;
            };
            self.add_weekly_generated_projects(
                recs,
                Some(week_number),
                Some(week::week_start(earliest)),
                None,
                earliest,
            );
        }
        self.last_generation_date = last_generation_date;
        true
    }

    /// Advances `week_start_date` to the ISO week containing `now`, recording
    /// how many tasks were completed during the week before it.
    pub fn roll_week(&mut self, now: DateTime<Utc>) -> bool {
        let current_start = week::week_start(now);
        if current_start <= self.week_start_date {
            return false;
        }

        let previous_start = current_start - week::week_length();
        self.last_week_completed_count =
            self.completed_count_between(previous_start, current_start) as u32;
        self.week_start_date = current_start;
        true
    }

    //=====================================================================================
    // Task Lifecycle
    //=====================================================================================

    pub fn task(&self, title: &str) -> Option<&CompletedTask> {
        let title = title.trim();
        self.completed_tasks.iter().find(|t| t.title == title)
    }

    fn task_mut(&mut self, title: &str) -> Option<&mut CompletedTask> {
        let title = title.trim();
        self.completed_tasks.iter_mut().find(|t| t.title == title)
    }

    /// Tasks completed within `[from, to)`.
    pub fn completed_count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> usize {
        self.completed_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| t.completed_at)
            .filter(|at| *at >= from && *at < to)
            .count()
    }

    /// Saves work in progress. Only paused (or new) tasks can be saved.
    pub fn save_task_progress(
        &mut self,
        title: &str,
        code: String,
        now: DateTime<Utc>,
    ) -> PortResult<&CompletedTask> {
        let title = validate_task_title(title)?;
        match self.task(&title).map(|t| t.status) {
            Some(TaskStatus::Paused) => {}
            Some(status) => {
                return Err(PortError::Conflict(format!(
                    "Task '{}' is already {}",
                    title,
                    status.as_str()
                )))
            }
            None => self.completed_tasks.push(CompletedTask {
                title: title.clone(),
                score: None,
                code: String::new(),
                ai_feedback: None,
                status: TaskStatus::Paused,
                completed_at: None,
                last_saved_at: now,
            }),
        }

        let task = self
            .task_mut(&title)
            .ok_or_else(|| PortError::Unexpected(format!("Task '{}' vanished", title)))?;
        task.code = code;
        task.last_saved_at = now;
        Ok(task)
    }

    /// Hands a task in for review. Paused and already-submitted tasks may be
    /// (re)submitted; completed ones are final.
    pub fn submit_task(
        &mut self,
        title: &str,
        code: String,
        now: DateTime<Utc>,
    ) -> PortResult<&CompletedTask> {
        let title = validate_task_title(title)?;
        if code.trim().is_empty() {
            return Err(PortError::Validation("Submitted code is empty".to_string()));
        }

        match self.task(&title).map(|t| t.status) {
            Some(TaskStatus::Completed) => {
                return Err(PortError::Conflict(format!(
                    "Task '{}' is already completed",
                    title
                )))
            }
            Some(_) => {}
            None => self.completed_tasks.push(CompletedTask {
                title: title.clone(),
                score: None,
                code: String::new(),
                ai_feedback: None,
                status: TaskStatus::Submitted,
                completed_at: None,
                last_saved_at: now,
            }),
        }

        let task = self
            .task_mut(&title)
            .ok_or_else(|| PortError::Unexpected(format!("Task '{}' vanished", title)))?;
        task.code = code;
        task.status = TaskStatus::Submitted;
        task.last_saved_at = now;
        Ok(task)
    }

    /// Records the review outcome of a submitted task.
    pub fn complete_task(
        &mut self,
        title: &str,
        score: u8,
        feedback: String,
        now: DateTime<Utc>,
    ) -> PortResult<&CompletedTask> {
        if score > 100 {
            return Err(PortError::Validation(format!(
                "Score {} is outside 0-100",
                score
            )));
        }

        let task = self
            .task_mut(title)
            .ok_or_else(|| PortError::NotFound(format!("Task '{}' not found", title.trim())))?;
        match task.status {
            TaskStatus::Submitted => {}
            TaskStatus::Paused => {
                return Err(PortError::Conflict(format!(
                    "Task '{}' must be submitted before it can be completed",
                    task.title
                )))
            }
            TaskStatus::Completed => {
                return Err(PortError::Conflict(format!(
                    "Task '{}' is already completed",
                    task.title
                )))
            }
        }

        task.score = Some(score);
        task.ai_feedback = Some(feedback);
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.last_saved_at = now;
        Ok(task)
    }
}

fn validate_task_title(title: &str) -> PortResult<String> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(PortError::Validation(
            "Task title must be 1-200 characters".to_string(),
        ));
    }
    Ok(title.to_string())
}
