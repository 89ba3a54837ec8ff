//! Macro expansion over config strings.
//!
//! [`MacroEngine::process`] rewrites a template in three passes, each scanning
//! the output of the previous one:
//!
//! 1. **References**: `[name]`, `[a/b/name]`, `[../name]` are replaced by the
//!    string form of the value found by walking the tree from the context node.
//!    Unresolvable references are left as written.
//! 2. **Expressions**: `EVAL(expr)` is replaced by the evaluator's result.
//!    Evaluation failures are logged and render as `null`.
//! 3. **Formatting**: `FORMAT(value)` / `FORMAT(value, pattern)` is replaced by
//!    the formatted number. A value that is not a number is an error.
//!
//! Because the passes run in that order, references can feed expressions and
//! expressions can feed formatting:
//!
//! ```text
//! "FORMAT(EVAL([price] * [qty]), 0.00)"  →  "FORMAT(EVAL(2.5 * 3), 0.00)"
//!                                         →  "FORMAT(7.5, 0.00)"
//!                                         →  "7.50"
//! ```

use std::ops::Range;

use serde_json::Value;

use crate::error::JsonfigError;
use crate::eval::{Arithmetic, Evaluator};
use crate::format::{DEFAULT_PATTERN, DecimalFormat, NumberFormatter};
use crate::node::ConfigNode;

const EVAL_OPEN: &str = "EVAL(";
const FORMAT_OPEN: &str = "FORMAT(";

/// Expands macros in config strings.
///
/// The engine itself is stateless between calls; it only carries the
/// collaborators used by the `EVAL` and `FORMAT` passes.
pub struct MacroEngine {
    evaluator: Box<dyn Evaluator>,
    formatter: Box<dyn NumberFormatter>,
    default_pattern: String,
}

impl Default for MacroEngine {
    fn default() -> Self {
        Self {
            evaluator: Box::new(Arithmetic),
            formatter: Box::new(DecimalFormat),
            default_pattern: DEFAULT_PATTERN.to_string(),
        }
    }
}

impl MacroEngine {
    /// An engine with the [`Arithmetic`] evaluator and the [`DecimalFormat`] formatter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the evaluator used for `EVAL(...)`.
    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    /// Replace the formatter used for `FORMAT(...)`.
    pub fn formatter(mut self, formatter: impl NumberFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    /// Set the pattern used by `FORMAT(value)` (default: [`DEFAULT_PATTERN`]).
    pub fn default_pattern(mut self, pattern: &str) -> Self {
        self.default_pattern = pattern.to_string();
        self
    }

    /// Expand every macro in `template`, resolving references against `context`.
    pub fn process(&self, template: &str, context: &ConfigNode) -> Result<String, JsonfigError> {
        let mut buf: Vec<char> = template.chars().collect();
        substitute_references(&mut buf, context);
        self.evaluate_expressions(&mut buf);
        self.format_numbers(&mut buf)?;
        Ok(buf.into_iter().collect())
    }

    /// Expand each template independently, preserving order.
    pub fn process_all<I, S>(
        &self,
        templates: I,
        context: &ConfigNode,
    ) -> Result<Vec<String>, JsonfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        templates
            .into_iter()
            .map(|template| self.process(template.as_ref(), context))
            .collect()
    }

    fn evaluate_expressions(&self, buf: &mut Vec<char>) {
        let open: Vec<char> = EVAL_OPEN.chars().collect();
        let mut index = 0;
        while let Some(start) = find(buf, &open, index) {
            let inner_start = start + open.len();
            let Some(close) = matching_paren(buf, inner_start) else {
                break;
            };
            let expr: String = buf[inner_start..close].iter().collect();
            let result = self.evaluate(&expr);
            index = start + splice(buf, start..close + 1, &result);
        }
    }

    fn evaluate(&self, expr: &str) -> String {
        match self.evaluator.evaluate(expr) {
            Ok(Some(Value::String(s))) => s,
            Ok(Some(value)) => value.to_string(),
            Ok(None) => "null".to_string(),
            Err(err) => {
                tracing::warn!(expression = expr, error = %err, "expression evaluation failed");
                "null".to_string()
            }
        }
    }

    fn format_numbers(&self, buf: &mut Vec<char>) -> Result<(), JsonfigError> {
        let open: Vec<char> = FORMAT_OPEN.chars().collect();
        let mut index = 0;
        while let Some(start) = find(buf, &open, index) {
            let inner_start = start + open.len();
            let Some(close) = matching_paren(buf, inner_start) else {
                break;
            };
            let args: String = buf[inner_start..close].iter().collect();
            let formatted = self.format_call(&args)?;
            index = start + splice(buf, start..close + 1, &formatted);
        }
        Ok(())
    }

    /// `value` or `value,pattern`, split on the first comma. A blank pattern
    /// falls back to the default one.
    fn format_call(&self, args: &str) -> Result<String, JsonfigError> {
        let (value, pattern) = match args.split_once(',') {
            Some((value, pattern)) if !pattern.trim().is_empty() => (value, pattern.trim()),
            Some((value, _)) => (value, self.default_pattern.as_str()),
            None => (args, self.default_pattern.as_str()),
        };
        let number: f64 = value
            .trim()
            .parse()
            .map_err(|source| JsonfigError::NumberParse {
                input: value.to_string(),
                source,
            })?;
        self.formatter.format(number, pattern)
    }
}

/// Expand `template` with the default engine.
pub fn process(template: &str, context: &ConfigNode) -> Result<String, JsonfigError> {
    MacroEngine::default().process(template, context)
}

/// Expand each of `templates` with the default engine, preserving order.
pub fn process_all<I, S>(templates: I, context: &ConfigNode) -> Result<Vec<String>, JsonfigError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    MacroEngine::default().process_all(templates, context)
}

/// Pass 1. Inserted text is skipped over, never rescanned.
fn substitute_references(buf: &mut Vec<char>, context: &ConfigNode) {
    let mut index = 0;
    while index < buf.len() {
        if buf[index] != '[' {
            index += 1;
            continue;
        }
        let start = index;
        let Some(end) = buf[start + 1..]
            .iter()
            .position(|&c| c == ']')
            .map(|offset| start + 1 + offset)
        else {
            break;
        };

        let token: String = buf[start + 1..end].iter().collect();
        match resolve_reference(&token, context) {
            Some(text) => index = start + splice(buf, start..end + 1, &text),
            None => {
                if !token.is_empty() {
                    tracing::trace!(token = %token, "unresolved reference left in place");
                }
                index = end + 1;
            }
        }
    }
}

fn resolve_reference(token: &str, context: &ConfigNode) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    let (node, name) = match token.rsplit_once('/') {
        Some((_, "")) => return None,
        Some((path, name)) => (navigate(context, path)?, name),
        None => (context.clone(), token),
    };
    node.get(name).map(|value| value.to_string())
}

/// Walk `/`-separated segments from `start`. `..` climbs (staying put at a
/// root); any other segment must name a child node.
fn navigate(start: &ConfigNode, path: &str) -> Option<ConfigNode> {
    let mut current = start.clone();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." {
            if let Some(parent) = current.parent() {
                current = parent;
            }
        } else {
            current = current.get_config(segment)?;
        }
    }
    Some(current)
}

fn find(buf: &[char], needle: &[char], from: usize) -> Option<usize> {
    if from > buf.len() {
        return None;
    }
    buf[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| from + offset)
}

/// Index of the `)` closing a call whose arguments start at `from`.
fn matching_paren(buf: &[char], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &c) in buf.iter().enumerate().skip(from) {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Replace `range` with `text`, returning the inserted length in chars.
fn splice(buf: &mut Vec<char>, range: Range<usize>, text: &str) -> usize {
    let before = buf.len();
    buf.splice(range.clone(), text.chars());
    buf.len() + range.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::EvalError;
    use crate::fixtures::test::{nested_tree, server_tree};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn expand(template: &str, context: &ConfigNode) -> String {
        process(template, context).unwrap()
    }

    // -- Pass 1: references -------------------------------------------------

    #[test]
    fn simple_reference() {
        let root = server_tree();
        assert_eq!(expand("[host]:[port]", &root), "localhost:8080");
    }

    #[test]
    fn path_reference() {
        let root = nested_tree();
        assert_eq!(expand("[a/b/name]", &root), "v");
    }

    #[test]
    fn parent_navigation_interleaved_with_children() {
        let root = nested_tree();
        let a = root.get_config("a").unwrap();
        assert_eq!(expand("[../a/../a/b/name]", &a), "v");
    }

    #[test]
    fn parent_navigation_from_leaf_node() {
        let root = nested_tree();
        let b = root.get_config("a").unwrap().get_config("b").unwrap();
        assert_eq!(expand("[../../a/b/name]", &b), "v");
        assert_eq!(expand("[../b/name]", &b), "v");
    }

    #[test]
    fn parent_at_root_is_noop() {
        let root = nested_tree();
        assert_eq!(expand("[../../a/b/name]", &root), "v");
    }

    #[test]
    fn empty_path_segments_ignored() {
        let root = nested_tree();
        assert_eq!(expand("[/a//b/name]", &root), "v");
    }

    #[test]
    fn missing_path_segment_left_verbatim() {
        let root = nested_tree();
        assert_eq!(expand("[missing/name]", &root), "[missing/name]");
    }

    #[test]
    fn missing_path_does_not_affect_rest_of_buffer() {
        let root = server_tree();
        assert_eq!(
            expand("[missing/name] on [host]", &root),
            "[missing/name] on localhost"
        );
    }

    #[test]
    fn missing_name_left_verbatim() {
        let root = server_tree();
        assert_eq!(expand("[nope] [host]", &root), "[nope] localhost");
    }

    #[test]
    fn empty_token_and_trailing_slash_left_verbatim() {
        let root = server_tree();
        assert_eq!(expand("[] [database/] [host]", &root), "[] [database/] localhost");
    }

    #[test]
    fn unclosed_bracket_left_verbatim() {
        let root = server_tree();
        assert_eq!(expand("[host] and [port", &root), "localhost and [port");
    }

    #[test]
    fn inner_open_bracket_is_part_of_token() {
        let root = ConfigNode::parse(r#"{"a[b": "weird", "b": "plain"}"#).unwrap();
        assert_eq!(expand("[a[b]", &root), "weird");
    }

    #[test]
    fn inserted_text_is_not_rescanned() {
        let root = ConfigNode::parse(r#"{"outer": "[inner]", "inner": "nope"}"#).unwrap();
        assert_eq!(expand("[outer]", &root), "[inner]");
        assert_eq!(expand("[outer][inner]", &root), "[inner]nope");
    }

    #[test]
    fn reference_to_list_and_node() {
        let root = server_tree();
        assert_eq!(expand("[tags]", &root), "[web, api]");
        assert_eq!(
            expand("[logging/file]", &root),
            r#"{"path":"/var/log/app.log","rotate":true}"#
        );
    }

    #[test]
    fn null_value_left_verbatim() {
        let root = server_tree();
        assert_eq!(expand("[optional]", &root), "[optional]");
    }

    #[test]
    fn references_resolve_from_child_context() {
        let root = server_tree();
        let db = root.get_config("database").unwrap();
        let label = db.get_string("label").unwrap().unwrap();
        assert_eq!(expand(&label, &db), "localhost pool of 5");
    }

    #[test]
    fn non_ascii_text_survives() {
        let root = ConfigNode::parse(r#"{"name": "Zoë"}"#).unwrap();
        assert_eq!(expand("héllo [name] ✓ [name]", &root), "héllo Zoë ✓ Zoë");
    }

    // -- Pass 2: EVAL -------------------------------------------------------

    #[test]
    fn nested_eval_parentheses() {
        let root = ConfigNode::new();
        assert_eq!(expand("EVAL(1+(2*3))", &root), "7");
    }

    #[test]
    fn eval_starting_with_paren() {
        let root = ConfigNode::new();
        assert_eq!(expand("EVAL((1+2)*3)", &root), "9");
    }

    #[test]
    fn eval_receives_exact_inner_text() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let engine = MacroEngine::new().evaluator(
            move |expr: &str| -> Result<Option<Value>, EvalError> {
                log.borrow_mut().push(expr.to_string());
                Ok(Some(json!("x")))
            },
        );
        let out = engine
            .process("a EVAL(f(1, (2)) + g()) b EVAL() c", &ConfigNode::new())
            .unwrap();
        assert_eq!(out, "a x b x c");
        assert_eq!(*seen.borrow(), vec!["f(1, (2)) + g()".to_string(), String::new()]);
    }

    #[test]
    fn multiple_evals() {
        let root = ConfigNode::new();
        assert_eq!(expand("EVAL(1+1) and EVAL(2*3)", &root), "2 and 6");
    }

    #[test]
    fn eval_uses_substituted_references() {
        let root = server_tree();
        assert_eq!(expand("EVAL([port] + 1)", &root), "8081");
    }

    #[test]
    fn eval_failure_renders_null() {
        let root = ConfigNode::new();
        assert_eq!(expand("x=EVAL(1/0);", &root), "x=null;");
    }

    #[test]
    fn eval_none_renders_null() {
        let engine = MacroEngine::new()
            .evaluator(|_: &str| -> Result<Option<Value>, EvalError> { Ok(None) });
        assert_eq!(engine.process("EVAL(void)", &ConfigNode::new()).unwrap(), "null");
    }

    #[test]
    fn deeply_nested_eval_renders_null() {
        let root = ConfigNode::new();
        let template = format!("EVAL({}1{})!", "(".repeat(20_000), ")".repeat(20_000));
        assert_eq!(expand(&template, &root), "null!");
    }

    #[test]
    fn unclosed_eval_left_verbatim() {
        let root = ConfigNode::new();
        assert_eq!(expand("EVAL(1+(2", &root), "EVAL(1+(2");
    }

    #[test]
    fn eval_result_is_not_reevaluated() {
        let engine = MacroEngine::new().evaluator(|_: &str| -> Result<Option<Value>, EvalError> {
            Ok(Some(json!("EVAL(2)")))
        });
        assert_eq!(
            engine.process("EVAL(1) EVAL(3)", &ConfigNode::new()).unwrap(),
            "EVAL(2) EVAL(2)"
        );
    }

    // -- Pass 3: FORMAT -----------------------------------------------------

    #[test]
    fn format_with_pattern() {
        let root = ConfigNode::new();
        assert_eq!(expand("FORMAT(3.14159,#.#)", &root), "3.1");
    }

    #[test]
    fn format_default_pattern() {
        let root = ConfigNode::new();
        assert_eq!(expand("FORMAT(2)", &root), "2");
        assert_eq!(expand("FORMAT(2.456)", &root), "2.46");
    }

    #[test]
    fn format_blank_pattern_uses_default() {
        let root = ConfigNode::new();
        assert_eq!(expand("FORMAT(2.5,)", &root), "2.5");
        assert_eq!(expand("FORMAT(2.456,  )", &root), "2.46");
    }

    #[test]
    fn format_trims_value_and_pattern() {
        let root = ConfigNode::new();
        assert_eq!(expand("FORMAT( 2.5 ,  0.00 )", &root), "2.50");
    }

    #[test]
    fn format_splits_on_first_comma() {
        let root = ConfigNode::new();
        assert_eq!(expand("FORMAT(1234567.891,#,##0.00)", &root), "1,234,567.89");
    }

    #[test]
    fn format_invalid_number_is_error() {
        let root = ConfigNode::new();
        assert!(matches!(
            process("FORMAT(abc)", &root),
            Err(JsonfigError::NumberParse { .. })
        ));
    }

    #[test]
    fn format_invalid_pattern_is_error() {
        let root = ConfigNode::new();
        assert!(matches!(
            process("FORMAT(1,#%)", &root),
            Err(JsonfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn format_after_eval() {
        let root = ConfigNode::new();
        assert_eq!(expand("FORMAT(EVAL(1/3))", &root), ".33");
        assert_eq!(expand("FORMAT(EVAL(1/3), 0.##)", &root), "0.33");
    }

    #[test]
    fn all_passes_together() {
        let root = ConfigNode::parse(r#"{"order": {"price": 2.5, "qty": 3}}"#).unwrap();
        let order = root.get_config("order").unwrap();
        assert_eq!(
            expand("Total: FORMAT(EVAL([price] * [qty]), 0.00)", &order),
            "Total: 7.50"
        );
    }

    #[test]
    fn custom_default_pattern_and_formatter() {
        let engine = MacroEngine::new().default_pattern("0.000");
        assert_eq!(engine.process("FORMAT(1)", &ConfigNode::new()).unwrap(), "1.000");

        let engine = MacroEngine::new()
            .formatter(|value: f64, pattern: &str| -> Result<String, JsonfigError> {
                Ok(format!("{value}|{pattern}"))
            });
        assert_eq!(
            engine.process("FORMAT(1.5, x)", &ConfigNode::new()).unwrap(),
            "1.5|x"
        );
    }

    // -- process_all --------------------------------------------------------

    #[test]
    fn process_all_preserves_order() {
        let root = server_tree();
        let out = process_all(["[host]", "[port]", "EVAL(2+2)"], &root).unwrap();
        assert_eq!(out, vec!["localhost", "8080", "4"]);
    }

    #[test]
    fn process_all_over_string_list() {
        let root = server_tree();
        let templates = vec!["[greeting]".to_string(), "plain".to_string()];
        let out = MacroEngine::new().process_all(&templates, &root).unwrap();
        assert_eq!(out, vec!["Listening on [host]:[port]", "plain"]);
    }

    #[test]
    fn process_all_propagates_errors() {
        let root = ConfigNode::new();
        assert!(process_all(["ok", "FORMAT(x)"], &root).is_err());
    }

    // -- helpers ------------------------------------------------------------

    #[test]
    fn matching_paren_tracks_depth() {
        let buf: Vec<char> = "a(b)c)d".chars().collect();
        assert_eq!(matching_paren(&buf, 0), Some(5));
        assert_eq!(matching_paren(&buf, 6), None);
    }

    #[test]
    fn splice_reports_inserted_length() {
        let mut buf: Vec<char> = "[x]!".chars().collect();
        assert_eq!(splice(&mut buf, 0..3, "héllo"), 5);
        assert_eq!(buf.iter().collect::<String>(), "héllo!");
    }
}
