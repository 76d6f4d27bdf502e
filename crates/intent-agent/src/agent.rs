//! The prompt-to-API agent

use std::sync::Arc;

use api_catalog::{
    Credentials, Headers, HttpRequest, HttpResponse, HttpTransport, Operation, ReqwestTransport,
    SpecCompiler, SpecSource,
};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{AgentError, AgentResult};
use crate::oracle::{OpenAiOracle, Oracle};
use crate::pipeline::{extract_arguments, select_operation};

/// Oracle model used when none is configured
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0613";

/// One API document to load into the catalog
#[derive(Debug, Clone)]
pub struct SpecConfig {
    pub source: SpecSource,
    /// Static credentials applied to every operation of this document
    pub auth: Option<Credentials>,
}

impl SpecConfig {
    pub fn new(source: impl Into<SpecSource>) -> Self {
        Self {
            source: source.into(),
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }
}

/// Agent construction options
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub api_key: String,
    pub model: Option<String>,
    /// Oracle endpoint override
    pub base_url: Option<String>,
    pub specs: Vec<SpecConfig>,
}

/// Caller-supplied headers and credentials for one resolution
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub headers: Headers,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub user_prompt: String,
    pub context: Option<RequestContext>,
    /// Include the dispatched request in the result
    pub verbose: bool,
}

impl ExecuteRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            context: None,
            verbose: false,
        }
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Outcome of one resolution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub original_prompt: String,
    pub selected_operation_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpRequest>,
    pub response: HttpResponse,
}

/// Resolves free-text prompts to operations and runs them
pub struct ApiAgent {
    oracle: Arc<dyn Oracle>,
    transport: Arc<dyn HttpTransport>,
    model: String,
    specs: Vec<SpecConfig>,
    catalog: OnceCell<Vec<Operation>>,
}

impl ApiAgent {
    pub fn new(options: AgentOptions) -> Self {
        let mut oracle = OpenAiOracle::new(options.api_key);
        if let Some(base_url) = options.base_url {
            oracle = oracle.with_base_url(base_url);
        }

        Self {
            oracle: Arc::new(oracle),
            transport: Arc::new(ReqwestTransport::new()),
            model: options.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            specs: options.specs,
            catalog: OnceCell::new(),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The compiled catalog, built on first use.
    ///
    /// A failed build is not kept, so the next call tries again.
    pub async fn catalog(&self) -> AgentResult<&[Operation]> {
        let operations = self
            .catalog
            .get_or_try_init(|| self.compile_catalog())
            .await?;
        Ok(operations.as_slice())
    }

    async fn compile_catalog(&self) -> AgentResult<Vec<Operation>> {
        let mut operations = Vec::new();
        for spec in &self.specs {
            let compiled = SpecCompiler::parse(&spec.source, spec.auth.clone()).await?;
            info!("Loaded {} operations from {}", compiled.len(), spec.source);
            operations.extend(compiled);
        }
        info!("Catalog ready with {} operations", operations.len());
        Ok(operations)
    }

    /// Select, extract and dispatch for one prompt
    pub async fn execute(&self, request: ExecuteRequest) -> AgentResult<ResolutionResult> {
        let ExecuteRequest {
            user_prompt,
            context,
            verbose,
        } = request;

        let catalog = self.catalog().await?;

        let operation = select_operation(self.oracle.as_ref(), &self.model, catalog, &user_prompt)
            .await?
            .ok_or_else(|| AgentError::UnresolvedIntent(user_prompt.clone()))?;

        let spec = operation.to_function_spec()?;
        let args = extract_arguments(self.oracle.as_ref(), &self.model, spec, &user_prompt).await?;

        let context = context.unwrap_or_default();
        let exchange = operation
            .execute(
                self.transport.as_ref(),
                &args,
                &context.headers,
                context.credentials.as_ref(),
            )
            .await?;

        Ok(ResolutionResult {
            original_prompt: user_prompt,
            selected_operation_identifier: operation.operation_id().to_string(),
            request: verbose.then_some(exchange.request),
            response: exchange.response,
        })
    }
}

impl std::fmt::Debug for ApiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiAgent")
            .field("model", &self.model)
            .field("specs", &self.specs)
            .field("compiled", &self.catalog.initialized())
            .finish_non_exhaustive()
    }
}
