//! Deferred values
//!
//! A [`Deferred`] is a placeholder for a value only the apply engine can
//! produce: a generated host name, an account key, a string built from
//! either. It is an immutable expression tree that records which resources
//! it reads from. The graph uses those sources to infer dependency edges;
//! the engine side evaluates it through a [`Resolver`] once the sources
//! exist. There is no way to read a deferred value synchronously.

use crate::error::{CloudError, Result};
use crate::resource::{GraphId, ResourceKey};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{(\d+)\}|[{}]").expect("valid placeholder regex"));

/// Which field of a key listing response a secret refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSelector {
    /// `keys[n].value`, the storage account listing shape
    Index(usize),
    /// A top-level field such as `key1`; matched case-insensitively
    Field(String),
}

impl SecretSelector {
    fn select<'a>(&self, response: &'a Value) -> Option<&'a Value> {
        match self {
            SecretSelector::Index(index) => response.get("keys")?.get(*index)?.get("value"),
            SecretSelector::Field(field) => {
                let object = response.as_object()?;
                object.get(field.as_str()).or_else(|| {
                    object
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(field))
                        .map(|(_, v)| v)
                })
            }
        }
    }
}

impl std::fmt::Display for SecretSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSelector::Index(index) => write!(f, "keys[{index}]"),
            SecretSelector::Field(field) => write!(f, "{field}"),
        }
    }
}

type MapApply = dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync;

/// Transformation registered through [`Deferred::map`]
#[derive(Clone)]
pub struct MapFn(Arc<MapApply>);

impl std::fmt::Debug for MapFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MapFn(..)")
    }
}

/// Expression tree behind a deferred value
#[derive(Debug, Clone)]
pub enum Expr {
    /// Already known at declaration time
    Known(Value),
    /// Output field published by a resource after apply
    Output {
        graph: GraphId,
        resource: ResourceKey,
        field: String,
    },
    /// Field selected from a resource's key listing query
    Secret {
        graph: GraphId,
        resource: ResourceKey,
        query: String,
        selector: SecretSelector,
    },
    /// Positional `{n}` template over other expressions
    Format {
        template: String,
        args: Vec<Arc<Expr>>,
    },
    /// User transformation of another expression
    Map {
        label: String,
        input: Arc<Expr>,
        apply: MapFn,
    },
}

impl Expr {
    /// Visit every resource reference along with the graph that issued it
    fn for_each_source(&self, f: &mut dyn FnMut(GraphId, &ResourceKey)) {
        match self {
            Expr::Known(_) => {}
            Expr::Output {
                graph, resource, ..
            }
            | Expr::Secret {
                graph, resource, ..
            } => f(*graph, resource),
            Expr::Format { args, .. } => {
                for arg in args {
                    arg.for_each_source(f);
                }
            }
            Expr::Map { input, .. } => input.for_each_source(f),
        }
    }

    /// Resources this expression reads from
    pub fn collect_sources(&self, out: &mut BTreeSet<ResourceKey>) {
        self.for_each_source(&mut |_, resource| {
            out.insert(resource.clone());
        });
    }

    /// First referenced resource that was declared in a graph other than `graph`
    pub fn foreign_source(&self, graph: GraphId) -> Option<ResourceKey> {
        let mut found = None;
        self.for_each_source(&mut |owner, resource| {
            if owner != graph && found.is_none() {
                found = Some(resource.clone());
            }
        });
        found
    }

    /// Tagged JSON form used in the manifest
    pub fn to_manifest_json(&self) -> Value {
        match self {
            Expr::Known(value) => value.clone(),
            Expr::Output {
                resource, field, ..
            } => serde_json::json!({
                "$output": { "resource": resource.to_string(), "field": field }
            }),
            Expr::Secret {
                resource,
                query,
                selector,
                ..
            } => serde_json::json!({
                "$secret": {
                    "resource": resource.to_string(),
                    "query": query,
                    "selector": selector,
                }
            }),
            Expr::Format { template, args } => serde_json::json!({
                "$format": {
                    "template": template,
                    "args": args.iter().map(|a| a.to_manifest_json()).collect::<Vec<_>>(),
                }
            }),
            Expr::Map { label, input, .. } => serde_json::json!({
                "$map": { "label": label, "input": input.to_manifest_json() }
            }),
        }
    }

    /// Evaluate against engine-recorded state; `None` while any source is pending
    pub fn evaluate(&self, resolver: &dyn Resolver) -> Result<Option<Value>> {
        match self {
            Expr::Known(value) => Ok(Some(value.clone())),
            Expr::Output {
                resource, field, ..
            } => {
                if !resolver.is_created(resource) {
                    return Ok(None);
                }
                Ok(resolver.output(resource, field).cloned())
            }
            Expr::Secret {
                resource,
                query,
                selector,
                ..
            } => {
                if !resolver.is_created(resource) {
                    return Ok(None);
                }
                let Some(response) = resolver.query_response(resource, query) else {
                    return Ok(None);
                };
                selector.select(response).cloned().map(Some).ok_or_else(|| {
                    CloudError::Resolve(format!(
                        "{query} response for {resource} has no {selector}"
                    ))
                })
            }
            Expr::Format { template, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    match arg.evaluate(resolver)? {
                        Some(value) => values.push(value),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::String(render_template(template, &values))))
            }
            Expr::Map {
                label,
                input,
                apply,
            } => match input.evaluate(resolver)? {
                Some(value) => (apply.0)(value)
                    .map(Some)
                    .map_err(|e| CloudError::Resolve(format!("{label}: {e}"))),
                None => Ok(None),
            },
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Known(value) => write!(f, "{value}"),
            Expr::Output {
                resource, field, ..
            } => write!(f, "{resource}.{field}"),
            Expr::Secret {
                resource,
                query,
                selector,
                ..
            } => write!(f, "{resource}.{query}().{selector}"),
            Expr::Format { template, args } => {
                write!(f, "format({template:?}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                write!(f, ")")
            }
            Expr::Map { label, input, .. } => write!(f, "{label}({input})"),
        }
    }
}

/// Access to what the engine has recorded after applying resources
pub trait Resolver {
    /// Whether the engine has finished creating `resource`
    fn is_created(&self, resource: &ResourceKey) -> bool;

    fn output(&self, resource: &ResourceKey, field: &str) -> Option<&Value>;

    /// Raw response of a key listing query run against `resource`
    fn query_response(&self, resource: &ResourceKey, query: &str) -> Option<&Value>;

    /// Evaluate a typed deferred value
    fn evaluate<T: DeserializeOwned>(&self, deferred: &Deferred<T>) -> Result<Resolution<T>>
    where
        Self: Sized,
    {
        match deferred.expr.evaluate(self)? {
            Some(value) => serde_json::from_value(value)
                .map(Resolution::Resolved)
                .map_err(|e| CloudError::Resolve(format!("{}: {e}", deferred.expr))),
            None => Ok(Resolution::Pending),
        }
    }
}

/// Outcome of evaluating a deferred value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Resolved(T),
    Pending,
}

impl<T> Resolution<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Resolution::Resolved(value) => Some(value),
            Resolution::Pending => None,
        }
    }
}

/// Typed handle on an [`Expr`]
pub struct Deferred<T> {
    expr: Arc<Expr>,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            expr: Arc::clone(&self.expr),
            _ty: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Deferred").field(&self.expr).finish()
    }
}

impl<T> std::fmt::Display for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&*self.expr, f)
    }
}

impl<T> Deferred<T> {
    fn from_expr(expr: Expr) -> Self {
        Self {
            expr: Arc::new(expr),
            _ty: PhantomData,
        }
    }

    pub(crate) fn output(graph: GraphId, resource: ResourceKey, field: &str) -> Self {
        Self::from_expr(Expr::Output {
            graph,
            resource,
            field: field.to_string(),
        })
    }

    pub(crate) fn secret(
        graph: GraphId,
        resource: ResourceKey,
        query: &str,
        selector: SecretSelector,
    ) -> Self {
        Self::from_expr(Expr::Secret {
            graph,
            resource,
            query: query.to_string(),
            selector,
        })
    }

    /// A value that is already known
    pub fn known(value: T) -> Self
    where
        T: Into<Value>,
    {
        Self::from_expr(Expr::Known(value.into()))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Resources this value is derived from
    pub fn sources(&self) -> BTreeSet<ResourceKey> {
        let mut out = BTreeSet::new();
        self.expr.collect_sources(&mut out);
        out
    }

    /// Interpolate this value into `template` as `{0}`
    pub fn format(&self, template: &str) -> Result<Deferred<String>> {
        self::format(template, [self])
    }

    /// Derive a new deferred value; `f` runs only at resolution time
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        T: DeserializeOwned,
        U: Serialize,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_labeled("map", f)
    }

    /// Like [`Deferred::map`], with a label shown in manifests and errors
    pub fn map_labeled<U, F>(&self, label: &str, f: F) -> Deferred<U>
    where
        T: DeserializeOwned,
        U: Serialize,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let apply = move |value: Value| {
            let input: T = serde_json::from_value(value).map_err(|e| e.to_string())?;
            serde_json::to_value(f(input)).map_err(|e| e.to_string())
        };
        Deferred::from_expr(Expr::Map {
            label: label.to_string(),
            input: Arc::clone(&self.expr),
            apply: MapFn(Arc::new(apply)),
        })
    }
}

/// One argument of [`format`]
#[derive(Debug, Clone)]
pub struct FormatArg(Arc<Expr>);

impl<T> From<Deferred<T>> for FormatArg {
    fn from(value: Deferred<T>) -> Self {
        FormatArg(value.expr)
    }
}

impl<T> From<&Deferred<T>> for FormatArg {
    fn from(value: &Deferred<T>) -> Self {
        FormatArg(Arc::clone(&value.expr))
    }
}

impl From<&str> for FormatArg {
    fn from(value: &str) -> Self {
        FormatArg(Arc::new(Expr::Known(Value::String(value.to_string()))))
    }
}

impl From<String> for FormatArg {
    fn from(value: String) -> Self {
        FormatArg(Arc::new(Expr::Known(Value::String(value))))
    }
}

/// Interpolate deferred values into a template once all of them resolve
///
/// Placeholders are positional (`{0}`, `{1}`); `{{` and `}}` stand for
/// literal braces. Placeholders past the end of `args` and stray braces are
/// rejected here rather than at resolution time.
pub fn format<I>(template: &str, args: I) -> Result<Deferred<String>>
where
    I: IntoIterator,
    I::Item: Into<FormatArg>,
{
    let args: Vec<Arc<Expr>> = args.into_iter().map(|a| a.into().0).collect();
    for caps in PLACEHOLDER.captures_iter(template) {
        let token = &caps[0];
        if let Some(index) = caps.get(1) {
            let index: usize = index.as_str().parse().map_err(|_| CloudError::InvalidTemplate {
                template: template.to_string(),
                reason: format!("placeholder {token} is not a valid index"),
            })?;
            if index >= args.len() {
                return Err(CloudError::InvalidTemplate {
                    template: template.to_string(),
                    reason: format!("placeholder {token} but only {} argument(s)", args.len()),
                });
            }
        } else if token.len() == 1 {
            return Err(CloudError::InvalidTemplate {
                template: template.to_string(),
                reason: format!("unmatched '{token}'"),
            });
        }
    }
    Ok(Deferred::from_expr(Expr::Format {
        template: template.to_string(),
        args,
    }))
}

/// `format` with heterogeneous arguments
///
/// ```ignore
/// let url = deferred_format!("https://{0}/{1}", app.default_host_name()?, "health")?;
/// ```
#[macro_export]
macro_rules! deferred_format {
    ($template:expr $(,)?) => {
        $crate::deferred::format(
            $template,
            ::std::iter::empty::<$crate::deferred::FormatArg>(),
        )
    };
    ($template:expr $(, $arg:expr)+ $(,)?) => {
        $crate::deferred::format($template, [$($crate::deferred::FormatArg::from($arg)),*])
    };
}

fn render_template(template: &str, values: &[Value]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[0] {
            "{{" => "{".to_string(),
            "}}" => "}".to_string(),
            _ => caps
                .get(1)
                .and_then(|i| i.as_str().parse::<usize>().ok())
                .and_then(|i| values.get(i))
                .map(value_to_text)
                .unwrap_or_default(),
        })
        .into_owned()
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A field of a declaration's property map
#[derive(Debug, Clone)]
pub enum Input {
    Literal(Value),
    Deferred(Arc<Expr>),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
}

/// Property map of a declaration
pub type Properties = BTreeMap<String, Input>;

impl Input {
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
    {
        Input::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn collect_sources(&self, out: &mut BTreeSet<ResourceKey>) {
        match self {
            Input::Literal(_) => {}
            Input::Deferred(expr) => expr.collect_sources(out),
            Input::List(items) => items.iter().for_each(|i| i.collect_sources(out)),
            Input::Map(entries) => entries.values().for_each(|i| i.collect_sources(out)),
        }
    }

    /// First reference to a resource declared outside `graph`
    pub fn foreign_source(&self, graph: GraphId) -> Option<ResourceKey> {
        match self {
            Input::Literal(_) => None,
            Input::Deferred(expr) => expr.foreign_source(graph),
            Input::List(items) => items.iter().find_map(|i| i.foreign_source(graph)),
            Input::Map(entries) => entries.values().find_map(|i| i.foreign_source(graph)),
        }
    }

    pub fn is_deferred(&self) -> bool {
        let mut sources = BTreeSet::new();
        self.collect_sources(&mut sources);
        !sources.is_empty()
    }

    pub fn to_manifest_json(&self) -> Value {
        match self {
            Input::Literal(value) => value.clone(),
            Input::Deferred(expr) => expr.to_manifest_json(),
            Input::List(items) => Value::Array(items.iter().map(Input::to_manifest_json).collect()),
            Input::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_manifest_json()))
                    .collect(),
            ),
        }
    }

    /// Fully resolved JSON for this input, or `None` while anything is pending
    pub fn evaluate(&self, resolver: &dyn Resolver) -> Result<Option<Value>> {
        match self {
            Input::Literal(value) => Ok(Some(value.clone())),
            Input::Deferred(expr) => expr.evaluate(resolver),
            Input::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.evaluate(resolver)? {
                        Some(value) => out.push(value),
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Input::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, item) in entries {
                    match item.evaluate(resolver)? {
                        Some(value) => {
                            out.insert(key.clone(), value);
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some(Value::Object(out)))
            }
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Literal(Value::String(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Input::Literal(Value::Bool(value))
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Input::Literal(Value::from(value))
    }
}

impl<T> From<Deferred<T>> for Input {
    fn from(value: Deferred<T>) -> Self {
        Input::Deferred(value.expr)
    }
}

impl<T> From<&Deferred<T>> for Input {
    fn from(value: &Deferred<T>) -> Self {
        Input::Deferred(Arc::clone(&value.expr))
    }
}

impl From<Vec<Input>> for Input {
    fn from(value: Vec<Input>) -> Self {
        Input::List(value)
    }
}

impl From<BTreeMap<String, Input>> for Input {
    fn from(value: BTreeMap<String, Input>) -> Self {
        Input::Map(value)
    }
}
