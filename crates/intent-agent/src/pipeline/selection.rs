//! Step 1: pick one operation from the catalog by its summary

use api_catalog::Operation;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AgentError, AgentResult, OracleStage};
use crate::oracle::{ChatMessage, CompletionRequest, Oracle};

/// Closed-list prompt listing every summary in catalog order
pub fn selection_prompt(summaries: &[String], user_prompt: &str) -> String {
    let list = Value::from(summaries.to_vec()).to_string();
    format!(
        "You must respond with one of the items in the following list: {list}. \
         Do not return anything if there's no match. \
         Do not make up any information not provided in the list. \
         Which item is described by '{user_prompt}'?"
    )
}

/// Trim the oracle answer and drop one trailing period
pub fn normalize_answer(answer: &str) -> &str {
    let answer = answer.trim();
    answer.strip_suffix('.').unwrap_or(answer)
}

/// Ask the oracle which operation the prompt describes.
///
/// `Ok(None)` covers an empty answer as well as an answer that names nothing
/// in the catalog.
pub async fn select_operation<'a>(
    oracle: &dyn Oracle,
    model: &str,
    catalog: &'a [Operation],
    user_prompt: &str,
) -> AgentResult<Option<&'a Operation>> {
    let summaries: Vec<String> = catalog.iter().map(Operation::summary).collect();

    let request = CompletionRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(selection_prompt(&summaries, user_prompt))],
        functions: None,
    };

    let response = oracle
        .complete(request)
        .await
        .map_err(|e| AgentError::oracle(OracleStage::Selection, e))?;

    let answer = normalize_answer(response.first_content().unwrap_or_default());
    if answer.is_empty() {
        debug!("Oracle found no operation for '{}'", user_prompt);
        return Ok(None);
    }

    match summaries.iter().position(|summary| summary == answer) {
        Some(index) => {
            let operation = &catalog[index];
            info!("Selected operation {} ({})", operation.operation_id(), answer);
            Ok(Some(operation))
        }
        None => {
            warn!("Oracle answered '{}', which is not in the catalog", answer);
            Ok(None)
        }
    }
}
