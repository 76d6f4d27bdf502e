//! Step 2: turn the prompt into arguments for the selected operation

use api_catalog::FunctionSpec;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{AgentError, AgentResult, OracleStage};
use crate::oracle::{ChatMessage, CompletionRequest, Oracle};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "Parse user input into arguments. \
     Leave missing parameters blank. \
     Do not make up any information not in user input.";

/// Ask the oracle to fill the function spec from the prompt.
///
/// Operations without parameters never reach the oracle.
pub async fn extract_arguments(
    oracle: &dyn Oracle,
    model: &str,
    spec: FunctionSpec,
    user_prompt: &str,
) -> AgentResult<Map<String, Value>> {
    if spec.has_no_parameters() {
        debug!("{} takes no arguments, skipping extraction", spec.name);
        return Ok(Map::new());
    }

    let name = spec.name.clone();
    let request = CompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ],
        functions: Some(vec![spec]),
    };

    let response = oracle
        .complete(request)
        .await
        .map_err(|e| AgentError::oracle(OracleStage::Extraction, e))?;

    let Some(call) = response.first_function_call() else {
        warn!("Oracle returned no function call for {}", name);
        return Ok(Map::new());
    };

    let arguments = match &call.arguments {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Unparseable arguments for {}: {}", name, e);
                return Ok(Map::new());
            }
        },
        other => other.clone(),
    };

    match arguments {
        Value::Object(map) => {
            debug!("Extracted arguments for {}: {:?}", name, map.keys().collect::<Vec<_>>());
            Ok(map)
        }
        other => {
            warn!("Arguments for {} are not an object: {}", name, other);
            Ok(Map::new())
        }
    }
}
