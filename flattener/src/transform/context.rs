//! Per-document evaluation context.

use chrono::NaiveDateTime;

use crate::document::Document;
use crate::timeutil::format_batch_time;
use crate::xpath::{EvalContext, Variables, DEFAULT_MAX_EVAL_NODES};

/// Everything a layer needs to resolve one document: the parsed tree, the
/// batch time and the variables exposed to expressions as `$name`.
///
/// The document is shared read-only, so a context can be borrowed by any
/// number of worker threads at once.
#[derive(Debug)]
pub struct DocumentContext<'a> {
    document: &'a Document,
    batch_time: String,
    variables: Variables,
    max_eval_nodes: usize,
}

impl<'a> DocumentContext<'a> {
    pub fn new(document: &'a Document, batch_time: &NaiveDateTime) -> Self {
        let batch_time = format_batch_time(batch_time);
        let mut variables = Variables::new();
        variables.insert("currenttime".to_string(), batch_time.clone());
        Self {
            document,
            batch_time,
            variables,
            max_eval_nodes: DEFAULT_MAX_EVAL_NODES,
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_max_eval_nodes(mut self, limit: usize) -> Self {
        self.max_eval_nodes = limit;
        self
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Batch time in canonical form.
    pub fn batch_time(&self) -> &str {
        &self.batch_time
    }

    /// A fresh evaluator with its own node-visit budget.
    ///
    /// Evaluators count visits in a `Cell`, so each task creates its own.
    pub fn eval_context(&self) -> EvalContext<'_> {
        EvalContext::new(self.document, self.max_eval_nodes).with_variables(&self.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::xpath::{Selector, XNode};
    use chrono::NaiveDate;

    #[test]
    fn test_variables_reach_expressions() {
        let doc = parse_str("<a/>").unwrap();
        let time = NaiveDate::from_ymd_opt(2021, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let ctx = DocumentContext::new(&doc, &time).with_variable("input_file_name", "a.xml");
        assert_eq!(ctx.batch_time(), "2021-06-01 08:30:00.000");

        let eval = ctx.eval_context();
        let root = XNode::Node(doc.root());
        let file = Selector::compile("$input_file_name").unwrap();
        assert_eq!(file.string(&eval, root).unwrap(), "a.xml");
        let now = Selector::compile("$currenttime").unwrap();
        assert_eq!(now.string(&eval, root).unwrap(), "2021-06-01 08:30:00.000");
    }

    #[test]
    fn test_budget_is_per_evaluator() {
        let doc = parse_str("<a><b/><b/><b/></a>").unwrap();
        let time = NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ctx = DocumentContext::new(&doc, &time).with_max_eval_nodes(1_000);
        let first = ctx.eval_context();
        let sel = Selector::compile("//b").unwrap();
        sel.select_general(&first, XNode::Node(doc.root())).unwrap();
        assert!(first.visited() > 0);
        assert_eq!(ctx.eval_context().visited(), 0);
    }
}
