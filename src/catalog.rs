use std::future::Future;
use std::io::{self, BufRead, Write};
use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use chrono::DateTime;

use crate::error::CatalogError;
use crate::terminal::{Style, paint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    /// Unix seconds.
    pub created: i64,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, created: i64) -> Self {
        Self {
            id: id.into(),
            created,
        }
    }
}

pub type CatalogFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<ModelInfo>, CatalogError>> + 'a>>;

pub trait ModelCatalog {
    fn list_models<'a>(&'a self) -> CatalogFuture<'a>;
}

/// Keeps chat-capable models, oldest first.
///
/// An empty `filter` keeps every id; instruct variants are always dropped.
pub fn chat_models(models: Vec<ModelInfo>, filter: &str) -> Vec<ModelInfo> {
    let mut kept: Vec<ModelInfo> = models
        .into_iter()
        .filter(|model| filter.is_empty() || model.id.contains(filter))
        .filter(|model| !model.id.contains("instruct"))
        .collect();
    kept.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
    kept
}

pub fn format_created(created: i64) -> String {
    DateTime::from_timestamp(created, 0)
        .map(|date| date.format("%B %d, %Y").to_string())
        .unwrap_or_else(|| "unknown date".to_string())
}

pub fn listing_lines(models: &[ModelInfo]) -> Vec<String> {
    let id_width = models.iter().map(|model| model.id.len()).max().unwrap_or(0);
    let number_width = models.len().to_string().len();
    models
        .iter()
        .enumerate()
        .map(|(idx, model)| {
            format!(
                "  {:>number_width$}) {:<id_width$}   {}",
                idx + 1,
                model.id,
                format_created(model.created)
            )
        })
        .collect()
}

/// Accepts either a 1-based list number or an exact model id.
pub fn resolve_selection<'m>(models: &'m [ModelInfo], answer: &str) -> Option<&'m ModelInfo> {
    let answer = answer.trim();
    if let Ok(number) = answer.parse::<usize>()
        && let Some(model) = number.checked_sub(1).and_then(|idx| models.get(idx))
    {
        return Some(model);
    }
    models.iter().find(|model| model.id == answer)
}

/// Picks the model to chat with, prompting when `requested` is missing or
/// unknown. `Ok(None)` means the user backed out at the prompt.
pub fn select_model<R: BufRead, W: Write>(
    models: &[ModelInfo],
    requested: Option<&str>,
    input: &mut R,
    out: &mut W,
) -> Result<Option<String>> {
    if let Some(requested) = requested
        && let Some(model) = models.iter().find(|model| model.id == requested)
    {
        return Ok(Some(model.id.clone()));
    }

    writeln!(out, "{}", paint(Style::Warning, "Available models:")).context("Failed to write to stdout")?;
    for line in listing_lines(models) {
        writeln!(out, "{}", paint(Style::Warning, &line)).context("Failed to write to stdout")?;
    }
    writeln!(out).context("Failed to write to stdout")?;
    write!(out, "Which model do you want to use? ").context("Failed to write to stdout")?;
    out.flush().context("Failed to flush stdout")?;

    let answer = read_answer(input).context("Failed to read model selection")?;
    writeln!(out).context("Failed to write to stdout")?;

    let Some(answer) = answer.filter(|answer| !answer.trim().is_empty()) else {
        return Ok(None);
    };
    resolve_selection(models, &answer)
        .map(|model| Some(model.id.clone()))
        .ok_or_else(|| anyhow!("Invalid model selected: '{}'", answer.trim()))
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}
