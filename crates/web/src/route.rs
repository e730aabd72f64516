//! Route definitions, path matching and routing outcomes.
//!
//! A [`Route`] is a compiled path pattern plus its method set, media-type
//! constraints, middleware chain, terminal handler and dispatch mode. The
//! pipeline holds routes in declaration order and [`select`] scans them
//! linearly; the first route whose path, method and media constraints all
//! match wins, regardless of specificity.

use crate::error::BoxError;
use crate::pipeline::{BlockingFn, Handler, Middleware};
use crate::txn::Transaction;
use http::{Method, StatusCode};
use mime::Mime;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use weft_runtime::NativeRequest;

/// Whether a route's terminal handler runs on the I/O loop or is offloaded
/// to the worker pool. Adapters and middleware always run on the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    NonBlocking,
    Blocking,
}

/// A compiled path pattern.
pub enum PathPattern {
    /// Matches the path byte-for-byte.
    Literal(String),
    /// `/user/:id` style: `:name` segments bind path parameters.
    Template { raw: String, matcher: matchit::Router<()> },
    /// Full-path regular expression; numbered capture groups bind
    /// positional parameters `param0, param1, …`.
    Regex(regex::Regex),
}

impl PathPattern {
    /// Parses a literal or templated pattern. Any `:name` segment makes it
    /// a template.
    pub fn parse(pattern: &str) -> Result<Self, RouteBuildError> {
        if !pattern.split('/').any(|segment| segment.starts_with(':')) {
            return Ok(PathPattern::Literal(pattern.to_owned()));
        }

        let converted = pattern
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some("") => Err(RouteBuildError::invalid_template(pattern, "empty parameter name")),
                Some(name) => Ok(format!("{{{name}}}")),
                None => Ok(segment.to_owned()),
            })
            .collect::<Result<Vec<_>, _>>()?
            .join("/");

        let mut matcher = matchit::Router::new();
        matcher.insert(&converted, ()).map_err(|e| RouteBuildError::invalid_template(pattern, e))?;
        Ok(PathPattern::Template { raw: pattern.to_owned(), matcher })
    }

    /// Compiles a regular-expression pattern, anchored to the full path.
    pub fn regex(pattern: &str) -> Result<Self, RouteBuildError> {
        let anchored = match (pattern.starts_with('^'), pattern.ends_with('$')) {
            (true, true) => pattern.to_owned(),
            (true, false) => format!("{pattern}$"),
            (false, true) => format!("^{pattern}"),
            (false, false) => format!("^{pattern}$"),
        };
        Ok(PathPattern::Regex(regex::Regex::new(&anchored)?))
    }

    /// Matches `path`, returning bound path parameters on success.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        match self {
            PathPattern::Literal(literal) => (literal == path).then(Vec::new),
            PathPattern::Template { matcher, .. } => {
                let matched = matcher.at(path).ok()?;
                Some(matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect())
            }
            PathPattern::Regex(regex) => {
                let captures = regex.captures(path)?;
                Some(
                    captures
                        .iter()
                        .skip(1)
                        .enumerate()
                        .filter_map(|(i, group)| group.map(|g| (format!("param{i}"), g.as_str().to_owned())))
                        .collect(),
                )
            }
        }
    }

    fn describe(&self) -> &str {
        match self {
            PathPattern::Literal(literal) => literal,
            PathPattern::Template { raw, .. } => raw,
            PathPattern::Regex(regex) => regex.as_str(),
        }
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.describe()).finish()
    }
}

/// A terminal routing rejection, produced before any handler runs.
///
/// Rejections are expected outcomes, not errors; each maps to its own
/// status and therefore its own error-handler registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotFound,
    MethodNotAllowed,
    UnsupportedMediaType,
    NotAcceptable,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Rejection::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Rejection::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
        }
    }

    // how far into a route's checks the request got; a later check failing
    // is the more specific rejection to report
    fn rank(self) -> u8 {
        match self {
            Rejection::NotFound => 0,
            Rejection::MethodNotAllowed => 1,
            Rejection::UnsupportedMediaType | Rejection::NotAcceptable => 2,
        }
    }

    fn prefer(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// The result of scanning the route list for one request.
#[derive(Debug)]
pub enum RouteOutcome<'r> {
    Matched { route: &'r Route, params: Vec<(String, String)> },
    Rejected(Rejection),
}

/// One route definition. Built by [`RouteBuilder`], immutable afterwards.
pub struct Route {
    pattern: PathPattern,
    methods: HashSet<Method>,
    consumes: Vec<Mime>,
    produces: Vec<Mime>,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: RouteHandler,
    mode: DispatchMode,
}

pub(crate) enum RouteHandler {
    Async(Arc<dyn Handler>),
    Blocking(Arc<BlockingFn>),
}

impl Route {
    /// Starts a route over a literal or `:name`-templated path.
    pub fn builder(path: &str) -> RouteBuilder {
        RouteBuilder::new(PathPattern::parse(path))
    }

    /// Starts a route over a regular-expression path.
    pub fn regex(pattern: &str) -> RouteBuilder {
        RouteBuilder::new(PathPattern::regex(pattern))
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub(crate) fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub(crate) fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    fn allows_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    fn accepts_content_type(&self, headers: &[(String, String)]) -> bool {
        if self.consumes.is_empty() {
            return true;
        }
        let Some(content_type) = single_header(headers, "content-type").and_then(|v| v.parse::<Mime>().ok()) else {
            return false;
        };
        self.consumes.iter().any(|consumed| media_matches(consumed, &content_type))
    }

    fn produces_acceptable(&self, headers: &[(String, String)]) -> bool {
        if self.produces.is_empty() {
            return true;
        }
        let Some(accept) = single_header(headers, "accept") else {
            return true;
        };
        let accepted: Vec<Mime> = accept
            .split(',')
            .filter_map(|entry| entry.split(';').next())
            .filter_map(|entry| entry.trim().parse::<Mime>().ok())
            .collect();
        if accepted.is_empty() {
            return true;
        }
        accepted.iter().any(|wanted| self.produces.iter().any(|produced| media_matches(wanted, produced)))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Scans `routes` in declaration order and returns the first full match,
/// or the most specific rejection seen across the scan.
pub fn select<'r>(routes: &'r [Route], req: &dyn NativeRequest) -> RouteOutcome<'r> {
    let uri = req.uri();
    let path = uri.path();
    let method = req.method();
    let headers = req.headers();

    let mut rejection = Rejection::NotFound;
    for route in routes {
        let Some(params) = route.pattern.matches(path) else {
            continue;
        };
        if !route.allows_method(&method) {
            rejection = rejection.prefer(Rejection::MethodNotAllowed);
            continue;
        }
        if !route.accepts_content_type(&headers) {
            rejection = rejection.prefer(Rejection::UnsupportedMediaType);
            continue;
        }
        if !route.produces_acceptable(&headers) {
            rejection = rejection.prefer(Rejection::NotAcceptable);
            continue;
        }
        return RouteOutcome::Matched { route, params };
    }
    RouteOutcome::Rejected(rejection)
}

/// `pattern` may carry wildcards (`*/*`, `text/*`); `concrete` is the
/// specific type being offered.
fn media_matches(pattern: &Mime, concrete: &Mime) -> bool {
    if pattern.type_() == mime::STAR {
        return true;
    }
    if pattern.type_() != concrete.type_() {
        return false;
    }
    pattern.subtype() == mime::STAR || pattern.subtype() == concrete.subtype()
}

fn single_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
}

/// Builder for one [`Route`]. Pattern errors surface at [`build`], like the
/// rest of the startup configuration.
///
/// [`build`]: RouteBuilder::build
pub struct RouteBuilder {
    pattern: Result<PathPattern, RouteBuildError>,
    methods: HashSet<Method>,
    consumes: Vec<Mime>,
    produces: Vec<Mime>,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: Option<RouteHandler>,
    mode: DispatchMode,
}

impl RouteBuilder {
    fn new(pattern: Result<PathPattern, RouteBuildError>) -> Self {
        Self {
            pattern,
            methods: HashSet::new(),
            consumes: Vec::new(),
            produces: Vec::new(),
            middleware: Vec::new(),
            handler: None,
            mode: DispatchMode::NonBlocking,
        }
    }

    /// Adds one allowed method. No methods at all means every method.
    pub fn method(mut self, method: Method) -> Self {
        self.methods.insert(method);
        self
    }

    /// Restricts the request `content-type`s this route consumes.
    pub fn consumes(mut self, mime: Mime) -> Self {
        self.consumes.push(mime);
        self
    }

    /// Restricts the media types this route produces, matched against the
    /// request's `accept` header.
    pub fn produces(mut self, mime: Mime) -> Self {
        self.produces.push(mime);
        self
    }

    /// Appends a middleware stage. Stages run in the order added.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Sets the terminal handler; it runs on the I/O loop.
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(RouteHandler::Async(Arc::new(handler)));
        self.mode = DispatchMode::NonBlocking;
        self
    }

    /// Sets a blocking terminal handler; the dispatcher offloads it to the
    /// worker pool.
    pub fn blocking_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Transaction) -> Result<Transaction, BoxError> + Send + Sync + 'static,
    {
        self.handler = Some(RouteHandler::Blocking(Arc::new(handler)));
        self.mode = DispatchMode::Blocking;
        self
    }

    pub fn build(self) -> Result<Route, RouteBuildError> {
        let pattern = self.pattern?;
        let handler = self.handler.ok_or_else(|| RouteBuildError::MissingHandler { path: pattern.describe().to_owned() })?;
        Ok(Route {
            pattern,
            methods: self.methods,
            consumes: self.consumes,
            produces: self.produces,
            middleware: self.middleware,
            handler,
            mode: self.mode,
        })
    }
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder").field("pattern", &self.pattern).field("methods", &self.methods).finish()
    }
}

#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("invalid path template {path}: {reason}")]
    InvalidTemplate { path: String, reason: String },

    #[error("invalid route regex: {source}")]
    InvalidRegex {
        #[from]
        source: regex::Error,
    },

    #[error("route {path} has no handler")]
    MissingHandler { path: String },
}

impl RouteBuildError {
    fn invalid_template<S: ToString>(path: &str, reason: S) -> Self {
        Self::InvalidTemplate { path: path.to_owned(), reason: reason.to_string() }
    }
}
