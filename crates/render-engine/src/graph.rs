//! Filter-complex AST and serializer.
//!
//! Graphs are assembled as nodes of `[in]filter,filter,...[out]` and only
//! turned into ffmpeg syntax at the very end, so tests can inspect the
//! structure instead of grepping strings.

use std::collections::HashMap;
use std::fmt;

/// One filter with its arguments, e.g. `trim=start=1.5:duration=10`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub name: String,
    pub args: Vec<FilterArg>,
}

/// A positional (`value`) or keyed (`key=value`) filter argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    Positional(String),
    Keyed(String, String),
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add `key=value`.
    pub fn arg(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args
            .push(FilterArg::Keyed(key.into(), value.to_string()));
        self
    }

    /// Add a bare value.
    pub fn value(mut self, value: impl fmt::Display) -> Self {
        self.args.push(FilterArg::Positional(value.to_string()));
        self
    }

    /// Value of a keyed argument.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            FilterArg::Keyed(k, v) if k == key => Some(v.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            match arg {
                FilterArg::Positional(v) => f.write_str(v)?,
                FilterArg::Keyed(k, v) => write!(f, "{k}={v}")?,
            }
        }
        Ok(())
    }
}

/// A linear filter chain between labelled pads.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub inputs: Vec<String>,
    pub chain: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl FilterNode {
    pub fn new<I, O, S, T>(inputs: I, chain: Vec<Filter>, outputs: O) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            chain,
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.chain.iter().any(|f| f.name == name)
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "[{input}]")?;
        }
        for (i, filter) in self.chain.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{filter}")?;
        }
        for output in &self.outputs {
            write!(f, "[{output}]")?;
        }
        Ok(())
    }
}

/// Problems found by [`FilterGraph::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    EmptyChain(usize),
    DuplicateOutput(String),
    UndefinedInput(String),
    UnconsumedOutput(String),
    ConsumedTwice(String),
}

/// An ordered list of nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    nodes: Vec<FilterNode>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: FilterNode) {
        self.nodes.push(node);
    }

    /// Append a single-input, single-output chain.
    pub fn chain(&mut self, input: &str, filters: Vec<Filter>, output: &str) {
        self.push(FilterNode::new([input], filters, [output]));
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    /// All filters in graph order.
    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.nodes.iter().flat_map(|n| n.chain.iter())
    }

    /// First filter with the given name.
    pub fn find(&self, name: &str) -> Option<&Filter> {
        self.filters().find(|f| f.name == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.filters().filter(|f| f.name == name).count()
    }

    /// Node producing `label`.
    pub fn producer(&self, label: &str) -> Option<&FilterNode> {
        self.nodes.iter().find(|n| n.outputs.iter().any(|o| o == label))
    }

    /// Serialize to `-filter_complex_script` syntax, one node per line.
    pub fn to_script(&self) -> String {
        self.nodes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";\n")
    }

    /// Structural checks: every pad produced once and consumed once,
    /// except stream specifiers like `0:v` (inputs) and `sinks` (outputs
    /// mapped onto the encoder).
    pub fn check(&self, sinks: &[&str]) -> Vec<GraphIssue> {
        let mut issues = Vec::new();
        let mut produced: HashMap<&str, usize> = HashMap::new();
        let mut consumed: HashMap<&str, usize> = HashMap::new();

        for (i, node) in self.nodes.iter().enumerate() {
            if node.chain.is_empty() {
                issues.push(GraphIssue::EmptyChain(i));
            }
            for input in &node.inputs {
                if is_stream_specifier(input) {
                    continue;
                }
                if !produced.contains_key(input.as_str()) {
                    issues.push(GraphIssue::UndefinedInput(input.clone()));
                }
                *consumed.entry(input.as_str()).or_default() += 1;
            }
            for output in &node.outputs {
                let count = produced.entry(output.as_str()).or_default();
                *count += 1;
                if *count > 1 {
                    issues.push(GraphIssue::DuplicateOutput(output.clone()));
                }
            }
        }

        let mut labels: Vec<&str> = produced.keys().copied().collect();
        labels.sort_unstable();
        for label in labels {
            match consumed.get(label).copied().unwrap_or(0) {
                0 if !sinks.contains(&label) => {
                    issues.push(GraphIssue::UnconsumedOutput(label.to_string()))
                }
                n if n > 1 => issues.push(GraphIssue::ConsumedTwice(label.to_string())),
                _ => {}
            }
        }
        issues
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_script())
    }
}

fn is_stream_specifier(label: &str) -> bool {
    label
        .split(':')
        .next()
        .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}

/// Format seconds for filter arguments.
pub fn secs(value: f64) -> String {
    format!("{:.3}", value.max(0.0))
}

/// Format a ratio or gain without trailing noise.
pub fn num(value: f64) -> String {
    let s = format!("{value:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
