//! Scripted fakes and fixtures shared by the unit tests

use std::collections::VecDeque;
use std::sync::Mutex;

use api_catalog::{
    CatalogResult, Dereferencer, Headers, HttpRequest, HttpResponse, HttpTransport, Operation,
    SpecCompiler, SpecDocument,
};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::oracle::{
    Choice, CompletionRequest, CompletionResponse, FunctionCall, Oracle, OracleError,
    ResponseMessage,
};

pub const PETSTORE_SPEC: &str = r##"
openapi: "3.0.0"
info:
  version: 1.0.0
  title: Swagger Petstore
servers:
  - url: http://petstore.swagger.io/v1
security:
  - bearerAuth: []
paths:
  /pets:
    get:
      summary: List all pets
      operationId: listPets
      security:
        - basicAuth: []
      responses:
        '200':
          description: A paged array of pets
    post:
      summary: Create a pet.
      operationId: createPets
      requestBody:
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/NewPet"
      responses:
        '201':
          description: Null response
  /pets/{petId}:
    get:
      summary: Info for a specific pet
      operationId: showPetById
      security:
        - ApiKeyAuth: []
        - bearerAuth: []
      parameters:
        - name: petId
          in: path
          required: true
          description: The id of the pet to retrieve
          schema:
            type: string
      responses:
        '200':
          description: Expected response to a valid request
components:
  schemas:
    NewPet:
      type: object
      required:
        - name
      properties:
        name:
          type: string
        tag:
          type: string
  securitySchemes:
    basicAuth:
      type: http
      scheme: basic
    bearerAuth:
      type: http
      scheme: bearer
    ApiKeyAuth:
      type: apiKey
      in: header
      name: X-Api-Key
"##;

/// The petstore fixture compiled without static auth
pub fn petstore_catalog() -> Vec<Operation> {
    let raw = SpecCompiler::parse_str(PETSTORE_SPEC).unwrap();
    let document = SpecDocument::new(Dereferencer::dereference(&raw));
    SpecCompiler::compile(document, None).unwrap()
}

/// Oracle that replays queued replies and records every request
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<CompletionResponse, OracleError>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text answer
    pub fn answer(self, content: &str) -> Self {
        self.push(Ok(reply(Some(content.to_string()), None)))
    }

    /// Queue a function call carrying `arguments`
    pub fn call_function(self, arguments: Value) -> Self {
        let call = FunctionCall {
            name: None,
            arguments,
        };
        self.push(Ok(reply(None, Some(call))))
    }

    pub fn fail(self, error: OracleError) -> Self {
        self.push(Err(error))
    }

    pub fn fail_transport(self, message: &str) -> Self {
        self.fail(OracleError::Transport(message.to_string()))
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn push(self, reply: Result<CompletionResponse, OracleError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }
}

fn reply(content: Option<String>, function_call: Option<FunctionCall>) -> CompletionResponse {
    CompletionResponse {
        choices: vec![Choice {
            message: ResponseMessage {
                content,
                function_call,
            },
        }],
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, OracleError> {
        self.calls.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Transport("no scripted reply".to_string())))
    }
}

/// Transport that records requests and answers 201 with a fixed pet
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(&self, request: &HttpRequest) -> CatalogResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Ok(HttpResponse {
            headers,
            status: 201,
            body: json!({"id": 1, "name": "Sticky"}),
        })
    }
}
