//! Side-by-side replay of the enabled flag and the skip sentinel.
//!
//! Each column owns an input text, a checkbox and an observer. Every step
//! rebuilds the column's request from its state, exactly like a view layer
//! rendering after a state change, and the observer decides whether anything
//! needs to happen.

use std::io::Write;
use std::sync::Arc;

use querygate_cache::{
    query_key, ExecutionRequest, QueryClient, QueryFn, QueryObserver, Snapshot,
};
use serde::Serialize;
use tracing::info;

use crate::config::{Column, DemoConfig, Step};
use crate::error::DemoError;
use crate::producer::DelayedEcho;

/// The rendered part of a snapshot. `data` is omitted while absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnView {
    pub is_loading: bool,
    pub is_fetching: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl From<&Snapshot<String>> for ColumnView {
    fn from(snapshot: &Snapshot<String>) -> Self {
        Self {
            is_loading: snapshot.is_loading,
            is_fetching: snapshot.is_fetching,
            data: snapshot.data.clone(),
        }
    }
}

/// Both columns after one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonView {
    pub step: usize,
    pub enabled: ColumnView,
    #[serde(rename = "skipToken")]
    pub skip_token: ColumnView,
}

struct ColumnState {
    column: Column,
    input: String,
    checked: bool,
    observer: QueryObserver<String>,
}

impl ColumnState {
    fn request(
        column: Column,
        input: &str,
        checked: bool,
        producer: &Arc<dyn QueryFn<String>>,
    ) -> ExecutionRequest<String> {
        match column {
            Column::Enabled => ExecutionRequest::new(query_key!["enabled", input], producer.clone())
                .with_enabled(checked),
            Column::SkipToken => {
                ExecutionRequest::skip_unless(query_key!["skipToken", input], checked, producer.clone())
            }
        }
    }

    fn open(
        client: &QueryClient<String>,
        column: Column,
        producer: &Arc<dyn QueryFn<String>>,
    ) -> Result<Self, DemoError> {
        let input = String::new();
        let observer = client.observe(Self::request(column, &input, true, producer))?;
        Ok(Self {
            column,
            input,
            checked: true,
            observer,
        })
    }

    fn rerender(&mut self, producer: &Arc<dyn QueryFn<String>>) -> Result<(), DemoError> {
        let request = Self::request(self.column, &self.input, self.checked, producer);
        if let Some(resolution) = self.observer.set_request(request)? {
            info!(column = ?self.column, input = %self.input, checked = self.checked, ?resolution, "Column re-evaluated");
        }
        Ok(())
    }

    fn view(&self) -> ColumnView {
        ColumnView::from(&self.observer.snapshot())
    }
}

/// Two columns sharing one client and one producer.
pub struct Comparison {
    producer: Arc<dyn QueryFn<String>>,
    enabled: ColumnState,
    skip_token: ColumnState,
    steps_applied: usize,
}

impl Comparison {
    /// Open both columns with empty input and checked boxes.
    pub fn new(
        client: &QueryClient<String>,
        producer: Arc<dyn QueryFn<String>>,
    ) -> Result<Self, DemoError> {
        let enabled = ColumnState::open(client, Column::Enabled, &producer)?;
        let skip_token = ColumnState::open(client, Column::SkipToken, &producer)?;
        Ok(Self {
            producer,
            enabled,
            skip_token,
            steps_applied: 0,
        })
    }

    pub async fn apply(&mut self, step: &Step) -> Result<(), DemoError> {
        let producer = Arc::clone(&self.producer);
        match step {
            Step::Type { column, text } => {
                let state = self.column_mut(*column);
                state.input = text.clone();
                state.rerender(&producer)?;
            }
            Step::Check { column, checked } => {
                let state = self.column_mut(*column);
                state.checked = *checked;
                state.rerender(&producer)?;
            }
            Step::Wait { ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
            }
        }
        self.steps_applied += 1;
        Ok(())
    }

    pub fn view(&self) -> ComparisonView {
        ComparisonView {
            step: self.steps_applied,
            enabled: self.enabled.view(),
            skip_token: self.skip_token.view(),
        }
    }

    fn column_mut(&mut self, column: Column) -> &mut ColumnState {
        match column {
            Column::Enabled => &mut self.enabled,
            Column::SkipToken => &mut self.skip_token,
        }
    }
}

/// Replay the configured steps, writing the view after the initial render
/// and after every step. Returns the views in order.
pub async fn run<W: Write>(config: &DemoConfig, out: &mut W) -> Result<Vec<ComparisonView>, DemoError> {
    let client = QueryClient::new(config.query_config())?;
    let producer: Arc<dyn QueryFn<String>> = Arc::new(DelayedEcho::new(config.fetch_delay()));
    let mut comparison = Comparison::new(&client, producer)?;

    let mut views = Vec::with_capacity(config.steps.len() + 1);
    let initial = comparison.view();
    render(out, &initial)?;
    views.push(initial);

    for step in &config.steps {
        comparison.apply(step).await?;
        let view = comparison.view();
        writeln!(out, "# {:?}", step)?;
        render(out, &view)?;
        views.push(view);
    }

    let stats = client.stats()?;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        stale_completions = stats.stale_completions,
        drops = stats.drops,
        "Replay finished"
    );
    Ok(views)
}

fn render<W: Write>(out: &mut W, view: &ComparisonView) -> Result<(), DemoError> {
    serde_json::to_writer_pretty(&mut *out, view)?;
    writeln!(out)?;
    Ok(())
}
