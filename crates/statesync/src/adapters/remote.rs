//! HTTP-backed adapter (§6): URL templating, query/body envelopes, and
//! the `AdapterSet` built from a single request/response contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use statesync_transport::{HttpClient, Method, RequestBuilderExt};
use url::Url;

use crate::config::EngineConfig;
use crate::error::Error;
use crate::record::Record;

use super::{AdapterSet, QueryParams};

/// A URL template using the `:identifier` placeholder grammar, e.g.
/// `"users/:id/todos"`.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
enum Part {
    Literal(String),
    Param(String),
}

impl UrlTemplate {
    /// Parse a template string. Placeholders start with `:` and continue
    /// through `[a-zA-Z_][a-zA-Z0-9_]*`.
    pub fn parse(template: impl Into<String>) -> Self {
        let template = template.into();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c == ':' {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty()
                    || name.chars().next().is_some_and(|c| c.is_ascii_digit())
                {
                    literal.push(':');
                    literal.push_str(&name);
                    continue;
                }
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Param(name));
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Self { parts }
    }

    /// Substitute every `:name` placeholder from `params`, removing
    /// consumed keys is the caller's responsibility (the template itself
    /// is read-only). Returns `Error::UrlTemplate` for the first missing
    /// parameter.
    pub fn render(&self, params: &QueryParams) -> Result<String, Error> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Param(name) => {
                    let value = params
                        .get(name)
                        .ok_or_else(|| Error::UrlTemplate { name: name.clone() })?;
                    out.push_str(&value_to_path_segment(value));
                }
            }
        }
        Ok(out)
    }

    /// Names of every `:param` this template consumes.
    pub fn param_names(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Param(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn value_to_path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string().trim_matches('"').to_string(),
    }
}

fn query_string(params: &QueryParams, exclude: &[&str]) -> String {
    let sorted: BTreeMap<&String, &Value> = params
        .iter()
        .filter(|(k, _)| !exclude.contains(&k.as_str()))
        .collect();
    if sorted.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = sorted
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, value_to_path_segment(v)))
        .collect();
    format!("?{}", pairs.join("&"))
}

/// Unwraps `data_key` from a response body, folding sibling keys into
/// `meta`. If `data_key` is `None` the whole body is the data.
fn unwrap_envelope(body: Value, data_key: Option<&str>) -> (Value, Map<String, Value>) {
    let Some(key) = data_key else {
        return (body, Map::new());
    };
    match body {
        Value::Object(mut map) => {
            let data = map.remove(key).unwrap_or(Value::Null);
            (data, map)
        }
        other => (other, Map::new()),
    }
}

/// Wraps an outgoing body under `request_key`, if set.
fn wrap_envelope(body: Value, request_key: Option<&str>) -> Value {
    match request_key {
        Some(key) => {
            let mut map = Map::new();
            map.insert(key.to_string(), body);
            Value::Object(map)
        }
        None => body,
    }
}

/// Builds an [`AdapterSet`] backed by HTTP requests against
/// `list_template`/`item_template`.
pub struct RemoteAdapter {
    client: HttpClient,
    config: Arc<EngineConfig>,
    list_template: UrlTemplate,
    item_template: UrlTemplate,
    data_key: Option<String>,
    request_key: Option<String>,
}

impl RemoteAdapter {
    /// Build a remote adapter. `item_template` defaults to `{list}/:id`
    /// when not given.
    pub fn new(
        client: HttpClient,
        config: Arc<EngineConfig>,
        list_template: impl Into<String>,
        item_template: Option<String>,
        data_key: Option<String>,
        request_key: Option<String>,
    ) -> Self {
        let list_template_str = list_template.into();
        let item_template = item_template
            .unwrap_or_else(|| format!("{list_template_str}/:id"));
        Self {
            client,
            config,
            list_template: UrlTemplate::parse(list_template_str),
            item_template: UrlTemplate::parse(item_template),
            data_key,
            request_key,
        }
    }

    fn resolve(&self, path: &str) -> Result<Url, Error> {
        self.config
            .base_url
            .join(path)
            .map_err(|_| Error::UrlTemplate {
                name: path.to_string(),
            })
    }

    async fn headers(&self) -> std::collections::HashMap<String, String> {
        self.config.get_headers.headers().await
    }

    #[tracing::instrument(skip(self, params))]
    async fn do_get<R: Record>(&self, params: QueryParams) -> Result<Vec<R>, Error> {
        let path = self.list_template.render(&params)?;
        let consumed = self.list_template.param_names();
        let url = self.resolve(&format!("{path}{}", query_string(&params, &consumed)))?;

        let mut builder = self.client.request(Method::Get, url.as_str());
        for (k, v) in self.headers().await {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Error::Transport)?;
        let body: Value = response.json().map_err(Error::Transport)?;
        let (data, _meta) = unwrap_envelope(body, self.data_key.as_deref());
        let items: Vec<R> = serde_json::from_value(data)?;
        Ok(items)
    }

    #[tracing::instrument(skip(self, params))]
    async fn do_get_one<R: Record>(&self, params: QueryParams) -> Result<R, Error> {
        let path = self.item_template.render(&params)?;
        let consumed = self.item_template.param_names();
        let url = self.resolve(&format!("{path}{}", query_string(&params, &consumed)))?;

        let mut builder = self.client.request(Method::Get, url.as_str());
        for (k, v) in self.headers().await {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Error::Transport)?;
        let body: Value = response.json().map_err(Error::Transport)?;
        let (data, _meta) = unwrap_envelope(body, self.data_key.as_deref());
        let item: R = serde_json::from_value(data)?;
        Ok(item)
    }

    #[tracing::instrument(skip(self, record))]
    async fn do_create<R: Record>(&self, record: R) -> Result<R, Error> {
        let url = self.resolve(&self.list_template.render(&QueryParams::new())?)?;
        let body = wrap_envelope(serde_json::to_value(&record)?, self.request_key.as_deref());

        let mut builder = self.client.request(Method::Post, url.as_str()).json(&body);
        for (k, v) in self.headers().await {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Error::Transport)?;
        let body: Value = response.json().map_err(Error::Transport)?;
        let (data, _meta) = unwrap_envelope(body, self.data_key.as_deref());
        Ok(serde_json::from_value(data)?)
    }

    #[tracing::instrument(skip(self, record))]
    async fn do_set<R: Record>(&self, record: R) -> Result<R, Error> {
        let mut params = QueryParams::new();
        params.insert("id".to_string(), Value::String(record.id()));
        let path = self.item_template.render(&params)?;
        let url = self.resolve(&path)?;
        let body = wrap_envelope(serde_json::to_value(&record)?, self.request_key.as_deref());

        let mut builder = self.client.request(Method::Put, url.as_str()).json(&body);
        for (k, v) in self.headers().await {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Error::Transport)?;
        let body: Value = response.json().map_err(Error::Transport)?;
        let (data, _meta) = unwrap_envelope(body, self.data_key.as_deref());
        Ok(serde_json::from_value(data)?)
    }

    #[tracing::instrument(skip(self, patch))]
    async fn do_patch<R: Record>(&self, id: String, patch: Value) -> Result<R, Error> {
        let mut params = QueryParams::new();
        params.insert("id".to_string(), Value::String(id));
        let path = self.item_template.render(&params)?;
        let url = self.resolve(&path)?;
        let body = wrap_envelope(patch, self.request_key.as_deref());

        let mut builder = self.client.request(Method::Patch, url.as_str()).json(&body);
        for (k, v) in self.headers().await {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Error::Transport)?;
        let body: Value = response.json().map_err(Error::Transport)?;
        let (data, _meta) = unwrap_envelope(body, self.data_key.as_deref());
        Ok(serde_json::from_value(data)?)
    }

    #[tracing::instrument(skip(self, params))]
    async fn do_delete(&self, params: QueryParams) -> Result<(), Error> {
        let path = self.item_template.render(&params)?;
        let consumed = self.item_template.param_names();
        let url = self.resolve(&format!("{path}{}", query_string(&params, &consumed)))?;

        let mut builder = self.client.request(Method::Delete, url.as_str());
        for (k, v) in self.headers().await {
            builder = builder.header(k, v);
        }
        let response = builder.send().await.map_err(Error::Transport)?;
        if !response.is_success() && !response.is_no_content() {
            return Err(Error::Transport(statesync_transport::Error::Status {
                status: response.status(),
                message: "delete failed".to_string(),
            }));
        }
        Ok(())
    }

    /// Convert this adapter into the generic operation set a store uses.
    pub fn into_adapter_set<R: Record>(self) -> AdapterSet<R> {
        let adapter = Arc::new(self);

        let get_adapter = adapter.clone();
        let get_one_adapter = adapter.clone();
        let create_adapter = adapter.clone();
        let set_adapter = adapter.clone();
        let patch_adapter = adapter.clone();
        let delete_adapter = adapter;

        AdapterSet {
            get: Some(Arc::new(move |params| {
                let adapter = get_adapter.clone();
                Box::pin(async move { adapter.do_get(params).await })
            })),
            get_one: Some(Arc::new(move |params| {
                let adapter = get_one_adapter.clone();
                Box::pin(async move { adapter.do_get_one(params).await })
            })),
            create: Some(Arc::new(move |record| {
                let adapter = create_adapter.clone();
                Box::pin(async move { adapter.do_create(record).await })
            })),
            set: Some(Arc::new(move |record| {
                let adapter = set_adapter.clone();
                Box::pin(async move { adapter.do_set(record).await })
            })),
            patch: Some(Arc::new(move |id, patch| {
                let adapter = patch_adapter.clone();
                Box::pin(async move { adapter.do_patch(id, patch).await })
            })),
            delete: Some(Arc::new(move |params| {
                let adapter = delete_adapter.clone();
                Box::pin(async move { adapter.do_delete(params).await })
            })),
        }
    }
}
