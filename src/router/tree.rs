//! Segment trie holding every route and path-scoped middleware.
//!
//! Each node owns one path segment. A node is *terminal* when a pattern ends
//! at it, which is recorded by storing the full pattern string; intermediate
//! nodes keep that string empty.
//!
//! Lookups walk the trie depth first. At every depth the children whose
//! segment equals the request segment are tried before the named and wildcard
//! children, and a branch that dead-ends is abandoned in favour of the next
//! candidate. Middleware registered on the nodes of the branch that finally
//! matches is collected in root-to-leaf order.

use std::collections::HashMap;

use thiserror::Error;

use super::path::{Segment, is_named, is_wildcard, split_segments};
use crate::context::Parameters;
use crate::http::Method;
use crate::middleware::HandlerFunc;

/// Errors raised while registering routes or middleware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("handler for {method} '{pattern}' is already registered")]
    Duplicate { method: Method, pattern: String },

    #[error("path '{pattern}' conflicts with existing paths [{}]", .existing.join(", "))]
    Conflict {
        pattern: String,
        existing: Vec<String>,
    },

    #[error("path '{pattern}' must start with '/'")]
    InvalidPattern { pattern: String },
}

/// Output of [`Tree::resolve`].
///
/// `handler` is `None` both when no terminal node matched and when the
/// matched node has no handler for the requested method.
pub struct Resolved {
    /// Middleware collected along the matched branch, outermost first.
    pub middlewares: Vec<HandlerFunc>,
    pub handler: Option<HandlerFunc>,
    pub params: Parameters,
}

// What an insertion stores at the node it reaches.
enum Payload {
    Handler(Method, HandlerFunc),
    Middlewares(Vec<HandlerFunc>),
}

#[derive(Default)]
struct Node {
    segment: String,
    // Named or wildcard segment.
    wild: bool,
    // Full pattern when this node terminates a registration, empty otherwise.
    pattern: String,
    handlers: HashMap<Method, HandlerFunc>,
    middlewares: Vec<HandlerFunc>,
    children: Vec<Node>,
}

impl Node {
    fn new(segment: &str) -> Self {
        Self {
            segment: segment.to_owned(),
            wild: is_named(segment) || is_wildcard(segment),
            ..Self::default()
        }
    }

    fn is_terminal(&self) -> bool {
        !self.pattern.is_empty()
    }

    fn child_position(&self, segment: &str) -> Option<usize> {
        self.children.iter().position(|child| child.segment == segment)
    }

    // Patterns under every child that cannot share a position with `segment`:
    // a different named segment, or a wildcard next to a non-wildcard.
    fn conflicting_patterns(&self, segment: &str) -> Vec<String> {
        let mut patterns = Vec::new();
        for child in &self.children {
            let named_clash =
                is_named(&child.segment) && is_named(segment) && child.segment != segment;
            let wildcard_clash = is_wildcard(&child.segment) != is_wildcard(segment);
            if named_clash || wildcard_clash {
                child.collect_patterns(&mut patterns);
            }
        }
        patterns
    }

    fn collect_patterns(&self, out: &mut Vec<String>) {
        if self.is_terminal() {
            out.push(self.pattern.clone());
        }
        for child in &self.children {
            child.collect_patterns(out);
        }
    }

    fn search<'n>(
        &'n self,
        parts: &[&str],
        depth: usize,
        chain: &mut Vec<HandlerFunc>,
    ) -> Option<&'n Node> {
        let mark = chain.len();
        chain.extend(self.middlewares.iter().cloned());

        if depth == parts.len() || is_wildcard(&self.segment) {
            if self.is_terminal() {
                return Some(self);
            }
            chain.truncate(mark);
            return None;
        }

        let part = parts[depth];
        let literal = self.children.iter().filter(|child| child.segment == part);
        let wild = self
            .children
            .iter()
            .filter(|child| child.wild && child.segment != part);

        for child in literal.chain(wild) {
            if let Some(found) = child.search(parts, depth + 1, chain) {
                return Some(found);
            }
        }

        // Nothing below this node matched: drop exactly what it contributed.
        chain.truncate(mark);
        None
    }
}

/// The routing trie.
///
/// Built through `&mut self` before serving and read through `&self`
/// afterwards; lookups never mutate the tree.
///
/// ```
/// use std::sync::Arc;
/// use ruta::Method;
/// use ruta::router::Tree;
///
/// let mut tree = Tree::new();
/// tree.register(Method::Get, "/users/:id", Arc::new(|_ctx: &mut ruta::Context| {}))
///     .unwrap();
///
/// let resolved = tree.resolve(&Method::Get, "/users/42");
/// assert!(resolved.handler.is_some());
/// assert_eq!(resolved.params.get("id"), Some("42"));
/// ```
#[derive(Default)]
pub struct Tree {
    root: Node,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `method` at `pattern`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::InvalidPattern`] when `pattern` does not start with `/`.
    /// - [`RouteError::Conflict`] when a segment cannot coexist with a sibling.
    /// - [`RouteError::Duplicate`] when `method` is already bound at `pattern`;
    ///   the existing handler is kept.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: HandlerFunc,
    ) -> Result<(), RouteError> {
        self.insert(pattern, Payload::Handler(method, handler))
    }

    /// Append `middlewares` to the node reached by `prefix`.
    ///
    /// The node becomes terminal, so a request that ends exactly at `prefix`
    /// resolves to it (without a handler unless one is registered there too).
    ///
    /// # Errors
    ///
    /// Same structural checks as [`register`](Self::register).
    pub fn register_middleware(
        &mut self,
        prefix: &str,
        middlewares: Vec<HandlerFunc>,
    ) -> Result<(), RouteError> {
        self.insert(prefix, Payload::Middlewares(middlewares))
    }

    /// Append `middlewares` at the root, where they apply to every request,
    /// matched or not. Equivalent to `register_middleware("/", ..)`, which
    /// cannot fail at the root.
    pub fn use_global(&mut self, middlewares: Vec<HandlerFunc>) {
        self.root.middlewares.extend(middlewares);
        if !self.root.is_terminal() {
            self.root.pattern = "/".to_owned();
        }
    }

    fn insert(&mut self, pattern: &str, payload: Payload) -> Result<(), RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::InvalidPattern {
                pattern: pattern.to_owned(),
            });
        }

        let mut node = &mut self.root;
        for segment in split_segments(pattern) {
            let existing = node.conflicting_patterns(segment);
            if !existing.is_empty() {
                return Err(RouteError::Conflict {
                    pattern: pattern.to_owned(),
                    existing,
                });
            }

            let index = match node.child_position(segment) {
                Some(index) => index,
                None => {
                    node.children.push(Node::new(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }

        match payload {
            Payload::Handler(method, handler) => {
                if node.handlers.contains_key(&method) {
                    return Err(RouteError::Duplicate {
                        method,
                        pattern: pattern.to_owned(),
                    });
                }
                node.handlers.insert(method, handler);
            }
            Payload::Middlewares(middlewares) => node.middlewares.extend(middlewares),
        }

        if !node.is_terminal() {
            node.pattern = pattern.to_owned();
        }
        Ok(())
    }

    /// Find the handler, middleware chain and path parameters for a request.
    ///
    /// When no registered pattern matches, the chain holds only the
    /// middleware registered at the root so global middleware still runs.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolved {
        let parts = split_segments(path);
        let mut chain = Vec::new();

        match self.root.search(&parts, 0, &mut chain) {
            Some(node) => Resolved {
                middlewares: chain,
                handler: node.handlers.get(method).cloned(),
                params: extract_params(&node.pattern, &parts),
            },
            None => Resolved {
                middlewares: self.root.middlewares.clone(),
                handler: None,
                params: Parameters::new(),
            },
        }
    }

    /// Every terminal pattern in the tree, parents before children.
    pub fn patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_patterns(&mut out);
        out
    }
}

fn extract_params(pattern: &str, parts: &[&str]) -> Parameters {
    let mut params = Parameters::new();
    for (i, raw) in split_segments(pattern).into_iter().enumerate() {
        match Segment::parse(raw) {
            Segment::Literal(_) => {}
            Segment::Named(name) => {
                if let Some(value) = parts.get(i) {
                    params.insert(name, *value);
                }
            }
            Segment::Wildcard(key) => {
                let rest = parts.get(i..).map(|rest| rest.join("/")).unwrap_or_default();
                params.insert(key, rest);
                break;
            }
        }
    }
    params
}
