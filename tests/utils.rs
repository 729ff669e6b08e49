#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockBuilder, Request, ResponseTemplate};

/// # Panics
///
/// Will panic if a file can't be read or missing
#[must_use = "This function returns the body of the file as a string"]
pub fn body_from_file(path: &str) -> String {
    fs::read_to_string(path).expect("Failed to read file")
}

fn request_json(request: &Request) -> Option<Value> {
    serde_json::from_slice(&request.body).ok()
}

/// Matches a JSON-RPC request by its `method` member
pub struct RpcMethodMatcher(String);

/// Shorthand for [`RpcMethodMatcher`].
pub fn rpc_method<M: Into<String>>(rpc_method: M) -> RpcMethodMatcher {
    RpcMethodMatcher(rpc_method.into())
}

impl Match for RpcMethodMatcher {
    fn matches(&self, request: &Request) -> bool {
        request_json(request)
            .and_then(|json| json.get("method").cloned())
            .is_some_and(|value| value == self.0.as_str())
    }
}

/// Matches a JSON-RPC request whose `params` equal the given value exactly
pub struct RpcParamsMatcher(Value);

/// Shorthand for [`RpcParamsMatcher`].
pub fn rpc_params(params: Value) -> RpcParamsMatcher {
    RpcParamsMatcher(params)
}

impl Match for RpcParamsMatcher {
    fn matches(&self, request: &Request) -> bool {
        request_json(request)
            .and_then(|json| json.get("params").cloned())
            .is_some_and(|params| params == self.0)
    }
}

/// Starts a mock for a POST to `/jsonrpc` calling `rpc_method`
pub fn rpc_mock(name: &str) -> MockBuilder {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(rpc_method(name))
}

/// 200 response with a JSON body read from `test-files/`
pub fn json_response(file: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .append_header("content-type", "application/json")
        .set_body_string(body_from_file(file))
}
