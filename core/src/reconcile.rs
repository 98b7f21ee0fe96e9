use anyhow::{Context, Result, bail};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::{
    Fields, GoalField, USERS_COLLECTION, Value, default_goal_fields, user_goals_path,
};
use crate::store::{DocumentStore, SetMode};

pub const DEFAULT_PAGE_SIZE: usize = 300;

/// How an existing goal record decides that a macro field still needs its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessCheck {
    /// Missing means absent or `null`. A stored `0` is kept.
    #[default]
    Presence,
    /// Missing means JavaScript-falsy: absent, `null`, `false`, `0`, `NaN` or `""`.
    /// A deliberately zero macro goal is reset to its default on every run.
    Truthy,
}

impl CompletenessCheck {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            CompletenessCheck::Presence => "presence",
            CompletenessCheck::Truthy => "truthy",
        }
    }

    #[must_use]
    pub fn is_missing(self, value: Option<&Value>) -> bool {
        match self {
            CompletenessCheck::Presence => matches!(value, None | Some(Value::Null)),
            CompletenessCheck::Truthy => !value.is_some_and(Value::is_truthy),
        }
    }
}

/// Macro fields of an existing goal record that need their default written.
#[must_use]
pub fn missing_macros(fields: &Fields, check: CompletenessCheck) -> Vec<GoalField> {
    GoalField::MACROS
        .into_iter()
        .filter(|f| check.is_missing(fields.get(f.key())))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub check: CompletenessCheck,
    pub page_size: usize,
    /// Users reconciled at once within a page. 1 means strictly sequential.
    pub concurrency: usize,
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            check: CompletenessCheck::default(),
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: 1,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated { filled: Vec<GoalField> },
    Unchanged,
}

impl Outcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated { .. } => "updated",
            Outcome::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserOutcome {
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    /// Rule used to decide which macro fields were missing.
    pub check: CompletenessCheck,
    pub users_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub outcomes: Vec<UserOutcome>,
}

impl RunReport {
    fn record(&mut self, outcome: UserOutcome) {
        self.users_seen += 1;
        match outcome.outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated { .. } => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Brings every user's `goals/main` record up to the default completeness bar
/// without overwriting values that are already there.
pub struct GoalReconciler<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    options: ReconcileOptions,
}

impl<'a, S: DocumentStore + ?Sized> GoalReconciler<'a, S> {
    pub fn new(store: &'a S, options: ReconcileOptions) -> Self {
        Self { store, options }
    }

    /// Walk every page of the users collection and reconcile each user.
    ///
    /// The first failing read or write aborts the run; users after it are
    /// left untouched.
    pub async fn run(&self) -> Result<RunReport> {
        let ReconcileOptions {
            page_size,
            concurrency,
            dry_run,
            ..
        } = self.options;
        if page_size == 0 {
            bail!("Page size must be greater than 0");
        }
        if concurrency == 0 {
            bail!("Concurrency must be at least 1");
        }

        let mut report = RunReport {
            dry_run,
            check: self.options.check,
            ..RunReport::default()
        };
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .store
                .list_documents(USERS_COLLECTION, page_size, page_token.as_deref())
                .await
                .context("Failed to list users")?;
            debug!(users = page.documents.len(), "fetched user page");

            let outcomes: Vec<UserOutcome> = stream::iter(&page.documents)
                .map(|user| self.reconcile_user(&user.id))
                .buffered(concurrency)
                .try_collect()
                .await?;
            for outcome in outcomes {
                report.record(outcome);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(
            users = report.users_seen,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            dry_run,
            "finished seeding and merging goals"
        );
        Ok(report)
    }

    /// Read one user's goal record and write whatever it is missing.
    pub async fn reconcile_user(&self, user_id: &str) -> Result<UserOutcome> {
        let path = user_goals_path(user_id);
        let existing = self
            .store
            .get_document(&path)
            .await
            .with_context(|| format!("Failed to read goals for user {user_id}"))?;

        let outcome = match existing {
            None => {
                if !self.options.dry_run {
                    self.store
                        .set_document(&path, &default_goal_fields(), SetMode::Overwrite)
                        .await
                        .with_context(|| format!("Failed to create goals for user {user_id}"))?;
                }
                Outcome::Created
            }
            Some(doc) => {
                let missing = missing_macros(&doc.fields, self.options.check);
                if missing.is_empty() {
                    Outcome::Unchanged
                } else {
                    if !self.options.dry_run {
                        let updates: Fields = missing
                            .iter()
                            .map(|f| (f.key().to_string(), Value::Integer(f.default_value())))
                            .collect();
                        self.store
                            .set_document(&path, &updates, SetMode::Merge)
                            .await
                            .with_context(|| {
                                format!("Failed to update goals for user {user_id}")
                            })?;
                    }
                    Outcome::Updated { filled: missing }
                }
            }
        };

        info!(
            user_id,
            outcome = outcome.label(),
            dry_run = self.options.dry_run,
            "reconciled goals"
        );
        Ok(UserOutcome {
            user_id: user_id.to_string(),
            outcome,
        })
    }
}
