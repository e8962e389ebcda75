//! Evaluation of parsed stylesheets into flat CSS.
//!
//! Rules are flattened into a list of [`Block`]s, each carrying the stack
//! of at-rules (`@media`, `@font-face`, ...) it is nested in. A block is
//! created when its rule is entered, so a parent rule always precedes its
//! children and later declarations of the parent still land in its block.

use super::parser::{self, split_important, split_top_level, Body, Import, Loc, MixinCall, MixinDef, Node, Param, ParseError, Rule};
use super::value::{self, Separator, Value, Variables};
use super::{LessError, LessOptions, SourceSpan};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Maximum nesting of mixin calls.
const MAX_MIXIN_DEPTH: usize = 100;

struct SourceText {
    text: String,
    spans: Vec<SourceSpan>,
}

/// Every text the compiler has parsed, for error locations and relative
/// import resolution.
#[derive(Default)]
struct Sources {
    files: Vec<SourceText>,
}

impl Sources {
    fn add(&mut self, text: String, spans: Vec<SourceSpan>) -> usize {
        self.files.push(SourceText { text, spans });
        self.files.len() - 1
    }

    fn text(&self, source: usize) -> &str {
        self.files.get(source).map(|f| f.text.as_str()).unwrap_or("")
    }

    fn span(&self, loc: Loc) -> Option<&SourceSpan> {
        let file = self.files.get(loc.source)?;
        let index = file.spans.partition_point(|s| s.start <= loc.offset);
        index.checked_sub(1).map(|i| &file.spans[i])
    }

    /// File display name and 1-based line for a location.
    fn locate(&self, loc: Loc) -> (Option<String>, Option<usize>) {
        let (Some(file), Some(span)) = (self.files.get(loc.source), self.span(loc)) else {
            return (None, None);
        };
        let end = loc.offset.min(file.text.len());
        let start = span.start.min(end);
        let line = file.text.as_bytes()[start..end].iter().filter(|&&b| b == b'\n').count() + 1;
        (Some(span.display.clone()), Some(line))
    }

    fn directory(&self, loc: Loc) -> Option<PathBuf> {
        self.span(loc)?.path.parent().map(Path::to_path_buf)
    }
}

/// Enclosing at-rule of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Wrapper {
    name: String,
    prelude: String,
    /// 0 for conditional rules that merge with equal neighbours, else unique
    id: usize,
}

#[derive(Debug, Clone)]
enum BlockKind {
    Rule { selectors: Vec<String>, decls: Vec<String> },
    Raw(String),
}

#[derive(Debug, Clone)]
struct Block {
    wrappers: Vec<Wrapper>,
    kind: BlockKind,
    /// False for blocks from reference imports
    visible: bool,
}

impl Block {
    fn is_empty(&self) -> bool {
        matches!(&self.kind, BlockKind::Rule { decls, .. } if decls.is_empty())
    }
}

#[derive(Debug, Clone)]
enum Callable {
    Mixin(Rc<MixinDef>),
    Ruleset(Rc<Rule>),
}

impl Callable {
    fn body(&self) -> Body {
        match self {
            Callable::Mixin(def) => def.body.clone(),
            Callable::Ruleset(rule) => rule.body.clone(),
        }
    }

    fn guard(&self) -> Option<&str> {
        match self {
            Callable::Mixin(def) => def.guard.as_deref(),
            Callable::Ruleset(rule) => rule.guard.as_deref(),
        }
    }
}

#[derive(Debug, Default)]
struct Frame {
    vars: HashMap<String, Value>,
    mixins: HashMap<String, Vec<Callable>>,
}

/// Variable view over the frame stack, optionally with an extra frame on
/// top that has not been pushed yet.
struct Scope<'a> {
    frames: &'a [Frame],
    top: Option<&'a Frame>,
}

impl Variables for Scope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.top
            .and_then(|f| f.vars.get(name))
            .or_else(|| self.frames.iter().rev().find_map(|f| f.vars.get(name)))
            .cloned()
    }
}

#[derive(Debug, Clone, Default)]
struct Context {
    /// Resolved selectors of the enclosing rule
    selectors: Vec<String>,
    wrappers: Vec<Wrapper>,
    /// Block receiving declarations
    target: Option<usize>,
    /// Inside a mixin called with `!important`
    important: bool,
}

struct PendingExtend {
    extenders: Vec<String>,
    target: String,
    all: bool,
}

pub(super) struct Evaluator<'o> {
    options: &'o LessOptions,
    sources: Sources,
    frames: Vec<Frame>,
    blocks: Vec<Block>,
    /// `@charset` and CSS `@import`s, printed first
    head: Vec<String>,
    extends: Vec<PendingExtend>,
    imported: HashSet<PathBuf>,
    /// Rulesets being evaluated, never matched as their own mixin
    active: Vec<Rc<Rule>>,
    next_wrapper_id: usize,
    mixin_depth: usize,
    reference_depth: usize,
}

impl<'o> Evaluator<'o> {
    pub(super) fn new(options: &'o LessOptions) -> Self {
        Self {
            options,
            sources: Sources::default(),
            frames: Vec::new(),
            blocks: Vec::new(),
            head: Vec::new(),
            extends: Vec::new(),
            imported: HashSet::new(),
            active: Vec::new(),
            next_wrapper_id: 0,
            mixin_depth: 0,
            reference_depth: 0,
        }
    }

    pub(super) fn compile(mut self, text: &str, spans: Vec<SourceSpan>) -> Result<String, LessError> {
        let source = self.sources.add(text.to_string(), spans);
        let nodes = parser::parse(text, source).map_err(|e| self.parse_error(e))?;
        self.frames.push(Frame::default());
        self.eval_nodes(&nodes, &Context::default())?;
        self.apply_extends();
        Ok(print(&self.head, &self.blocks))
    }

    fn error(&self, message: impl Into<String>, loc: Loc) -> LessError {
        let (file, line) = self.sources.locate(loc);
        LessError { message: message.into(), file, line }
    }

    fn parse_error(&self, e: ParseError) -> LessError {
        self.error(e.message, e.loc)
    }

    fn scope(&self) -> Scope<'_> {
        Scope { frames: &self.frames, top: None }
    }

    fn value(&self, text: &str, loc: Loc) -> Result<Value, LessError> {
        value::evaluate(text, &self.scope()).map_err(|m| self.error(m, loc))
    }

    fn interpolate(&self, text: &str, loc: Loc) -> Result<String, LessError> {
        value::interpolate(text, &self.scope()).map_err(|m| self.error(m, loc))
    }

    fn substitute(&self, text: &str, loc: Loc) -> Result<String, LessError> {
        value::substitute(text, &self.scope()).map_err(|m| self.error(m, loc))
    }

    fn define_variable(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.vars.insert(name.to_string(), value);
        }
    }

    fn define_mixin(&mut self, name: &str, callable: Callable) {
        if let Some(frame) = self.frames.last_mut() {
            frame.mixins.entry(name.to_string()).or_default().push(callable);
        }
    }

    /// Register a ruleset under each of its selectors that reads as a mixin name.
    fn define_ruleset(&mut self, selector: &str, rule: &Rc<Rule>) {
        for part in split_top_level(selector, b',') {
            let part = part.trim();
            if parser::is_simple_mixin_name(part) {
                self.define_mixin(part, Callable::Ruleset(rule.clone()));
            }
        }
    }

    /// Run `f` with `frame` pushed on the scope stack.
    fn scoped(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> Result<(), LessError>,
    ) -> Result<(), LessError> {
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }

    fn push_block(&mut self, wrappers: Vec<Wrapper>, kind: BlockKind) -> usize {
        self.blocks.push(Block { wrappers, kind, visible: self.reference_depth == 0 });
        self.blocks.len() - 1
    }

    fn push_rule(&mut self, wrappers: Vec<Wrapper>, selectors: Vec<String>) -> usize {
        self.push_block(wrappers, BlockKind::Rule { selectors, decls: Vec::new() })
    }

    fn eval_nodes(&mut self, nodes: &[Node], ctx: &Context) -> Result<(), LessError> {
        // Mixins are visible to the whole block, ahead of their definition
        for node in nodes {
            match node {
                Node::Mixin(def) => self.define_mixin(&def.name, Callable::Mixin(def.clone())),
                Node::Rule(rule) if !rule.selector.contains("@{") => self.define_ruleset(&rule.selector, rule),
                _ => {}
            }
        }
        for node in nodes {
            self.eval_node(node, ctx)?;
        }
        Ok(())
    }

    fn eval_node(&mut self, node: &Node, ctx: &Context) -> Result<(), LessError> {
        match node {
            Node::Variable { name, value, loc } => {
                let value = self.value(value, *loc)?;
                self.define_variable(name, value);
            }
            Node::Declaration { name, value, loc } => self.declaration(name, value, *loc, ctx)?,
            Node::Rule(rule) => self.rule(rule, ctx)?,
            Node::Mixin(_) => {}
            Node::Call(call) => self.call(call, ctx)?,
            Node::AtRule { name, prelude, body, loc } => {
                self.at_rule(name, prelude, body.as_ref(), *loc, ctx)?
            }
            Node::Import(import) => self.import(import, ctx)?,
            Node::Extend { targets, loc } => {
                if ctx.selectors.is_empty() {
                    return Err(self.error("extend is only allowed inside a ruleset", *loc));
                }
                self.add_extends(&ctx.selectors, targets);
            }
        }
        Ok(())
    }

    fn declaration(&mut self, name: &str, value: &str, loc: Loc, ctx: &Context) -> Result<(), LessError> {
        let Some(target) = ctx.target else {
            return Err(self.error("declarations are only allowed inside a ruleset", loc));
        };
        let name = self.interpolate(name, loc)?;
        let (value, important) = split_important(value);
        let value = self.value(value, loc)?.to_css();
        let decl = if important || ctx.important {
            format!("{}: {} !important", name, value)
        } else {
            format!("{}: {}", name, value)
        };
        if let BlockKind::Rule { decls, .. } = &mut self.blocks[target].kind {
            decls.push(decl);
        }
        Ok(())
    }

    fn rule(&mut self, rule: &Rc<Rule>, ctx: &Context) -> Result<(), LessError> {
        let selector = self.interpolate(&rule.selector, rule.loc)?;
        if rule.selector.contains("@{") {
            self.define_ruleset(&selector, rule);
        }
        if let Some(guard) = &rule.guard {
            if !self.guard(guard, rule.loc, None, false)? {
                return Ok(());
            }
        }

        let selectors = combine_selectors(&ctx.selectors, &selector);
        let target = self.push_rule(ctx.wrappers.clone(), selectors.clone());
        self.add_extends(&selectors, &rule.extends);

        let inner = Context {
            selectors,
            wrappers: ctx.wrappers.clone(),
            target: Some(target),
            important: ctx.important,
        };
        self.active.push(rule.clone());
        let result = self.scoped(Frame::default(), |this| this.eval_nodes(&rule.body, &inner));
        self.active.pop();
        result
    }

    fn add_extends(&mut self, extenders: &[String], targets: &[parser::ExtendTarget]) {
        for target in targets {
            self.extends.push(PendingExtend {
                extenders: extenders.to_vec(),
                target: normalize_selector(&target.selector),
                all: target.all,
            });
        }
    }

    fn at_rule(
        &mut self,
        name: &str,
        prelude: &str,
        body: Option<&Body>,
        loc: Loc,
        ctx: &Context,
    ) -> Result<(), LessError> {
        let prelude = self.substitute(prelude, loc)?;

        let Some(body) = body else {
            if self.reference_depth > 0 {
                return Ok(());
            }
            let text = if prelude.is_empty() {
                format!("@{};", name)
            } else {
                format!("@{} {};", name, prelude)
            };
            if name.eq_ignore_ascii_case("charset") {
                if !self.head.iter().any(|h| h.starts_with("@charset")) {
                    self.head.insert(0, text);
                }
            } else {
                self.push_block(ctx.wrappers.clone(), BlockKind::Raw(text));
            }
            return Ok(());
        };

        let unprefixed = match name.strip_prefix('-') {
            Some(rest) => rest.split_once('-').map_or(name, |(_, n)| n),
            None => name,
        };
        let bubbles = matches!(
            unprefixed.to_ascii_lowercase().as_str(),
            "media" | "supports" | "document"
        );

        if bubbles {
            let mut wrappers = ctx.wrappers.clone();
            match wrappers.last_mut() {
                Some(last) if last.id == 0 && last.name.eq_ignore_ascii_case(name) => {
                    last.prelude = format!("{} and {}", last.prelude, prelude);
                }
                _ => wrappers.push(Wrapper { name: name.to_string(), prelude, id: 0 }),
            }
            let target = if ctx.selectors.is_empty() {
                None
            } else {
                Some(self.push_rule(wrappers.clone(), ctx.selectors.clone()))
            };
            let inner = Context { selectors: ctx.selectors.clone(), wrappers, target, important: ctx.important };
            return self.scoped(Frame::default(), |this| this.eval_nodes(body, &inner));
        }

        self.next_wrapper_id += 1;
        let mut wrappers = ctx.wrappers.clone();
        wrappers.push(Wrapper { name: name.to_string(), prelude, id: self.next_wrapper_id });
        let target = self.push_rule(wrappers.clone(), Vec::new());
        let inner = Context { selectors: Vec::new(), wrappers, target: Some(target), important: false };
        self.scoped(Frame::default(), |this| this.eval_nodes(body, &inner))
    }

    fn call(&mut self, call: &MixinCall, ctx: &Context) -> Result<(), LessError> {
        let display = call.path.join(" > ");
        let candidates = self
            .find_callables(&call.path)
            .ok_or_else(|| self.error(format!("undefined mixin {}", display), call.loc))?;

        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push((arg.name.clone(), self.value(&arg.value, call.loc)?));
        }

        if self.mixin_depth >= MAX_MIXIN_DEPTH {
            return Err(self.error(
                format!("maximum mixin nesting exceeded calling {}", display),
                call.loc,
            ));
        }

        // Guards that fail are silent; arguments that fit nothing are an error
        let mut bound = false;
        let mut matched = Vec::new();
        let mut deferred = Vec::new();
        for candidate in candidates {
            let frame = match &candidate {
                Callable::Ruleset(rule) => {
                    if !args.is_empty() || self.active.iter().any(|r| Rc::ptr_eq(r, rule)) {
                        continue;
                    }
                    Frame::default()
                }
                Callable::Mixin(def) => match self.bind(def, &args, call.loc)? {
                    Some(frame) => frame,
                    None => continue,
                },
            };
            bound = true;
            match candidate.guard() {
                Some(guard) if guard.contains("default()") => deferred.push((candidate, frame)),
                Some(guard) => {
                    if self.guard(guard, call.loc, Some(&frame), false)? {
                        matched.push((candidate, frame));
                    }
                }
                None => matched.push((candidate, frame)),
            }
        }

        // default() is true only when nothing else matched
        let default = matched.is_empty();
        for (candidate, frame) in deferred {
            let holds = match candidate.guard() {
                Some(guard) => self.guard(guard, call.loc, Some(&frame), default)?,
                None => true,
            };
            if holds {
                matched.push((candidate, frame));
            }
        }

        if !bound {
            let args = call.args.iter().map(|a| a.value.as_str()).collect::<Vec<_>>().join(", ");
            return Err(self.error(
                format!("no matching definition was found for `{}({})`", display, args),
                call.loc,
            ));
        }

        let inner = Context { important: ctx.important || call.important, ..ctx.clone() };
        self.mixin_depth += 1;
        let mut result = Ok(());
        for (callable, frame) in matched {
            let body = callable.body();
            if let Callable::Ruleset(rule) = &callable {
                self.active.push(rule.clone());
            }
            result = self.scoped(frame, |this| this.eval_nodes(&body, &inner));
            if let Callable::Ruleset(_) = &callable {
                self.active.pop();
            }
            if result.is_err() {
                break;
            }
        }
        self.mixin_depth -= 1;
        result
    }

    /// Definitions reachable through a namespace path, from the innermost
    /// scope that defines the first segment.
    fn find_callables(&self, path: &[String]) -> Option<Vec<Callable>> {
        let (first, rest) = path.split_first()?;
        let mut candidates = self.frames.iter().rev().find_map(|f| f.mixins.get(first))?.clone();
        for segment in rest {
            let mut next = Vec::new();
            for candidate in &candidates {
                collect_definitions(&candidate.body(), segment, &mut next);
            }
            if next.is_empty() {
                return None;
            }
            candidates = next;
        }
        Some(candidates)
    }

    /// Bind call arguments to a mixin's parameters; `None` if they do not fit.
    fn bind(
        &self,
        def: &MixinDef,
        args: &[(Option<String>, Value)],
        loc: Loc,
    ) -> Result<Option<Frame>, LessError> {
        let named: Vec<(&str, &Value)> =
            args.iter().filter_map(|(n, v)| n.as_deref().map(|n| (n, v))).collect();
        let known = |name: &str| {
            def.params
                .iter()
                .any(|p| matches!(p, Param::Named { name: param, .. } if param.as_str() == name))
        };
        if named.iter().any(|(name, _)| !known(name)) {
            return Ok(None);
        }

        let mut positional = args.iter().filter(|(n, _)| n.is_none()).map(|(_, v)| v);
        let mut frame = Frame::default();
        let mut arguments = Vec::new();

        for param in &def.params {
            match param {
                Param::Named { name, default } => {
                    let value = if let Some((_, v)) = named.iter().find(|(n, _)| *n == name.as_str()) {
                        (*v).clone()
                    } else if let Some(v) = positional.next() {
                        v.clone()
                    } else if let Some(default) = default {
                        let scope = Scope { frames: &self.frames, top: Some(&frame) };
                        value::evaluate(default, &scope).map_err(|m| self.error(m, loc))?
                    } else {
                        return Ok(None);
                    };
                    arguments.push(value.clone());
                    frame.vars.insert(name.clone(), value);
                }
                Param::Pattern(pattern) => match positional.next() {
                    Some(v) if v.to_css() == *pattern => arguments.push(v.clone()),
                    _ => return Ok(None),
                },
                Param::Rest(name) => {
                    let rest: Vec<Value> = positional.by_ref().cloned().collect();
                    arguments.extend(rest.iter().cloned());
                    if let Some(name) = name {
                        frame
                            .vars
                            .insert(name.clone(), Value::List { items: rest, separator: Separator::Space });
                    }
                }
            }
        }
        if positional.next().is_some() {
            return Ok(None);
        }

        frame
            .vars
            .insert("arguments".to_string(), Value::List { items: arguments, separator: Separator::Space });
        Ok(Some(frame))
    }

    /// Evaluate a guard: `,` separates alternatives, `and` joins conditions.
    fn guard(&self, guard: &str, loc: Loc, top: Option<&Frame>, default: bool) -> Result<bool, LessError> {
        for alternative in split_top_level(guard, b',') {
            let mut holds = true;
            for condition in split_and(alternative) {
                if !self.condition(condition.trim(), loc, top, default)? {
                    holds = false;
                    break;
                }
            }
            if holds {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn condition(&self, text: &str, loc: Loc, top: Option<&Frame>, default: bool) -> Result<bool, LessError> {
        let (negate, text) = match text.strip_prefix("not") {
            Some(rest) if rest.trim_start().starts_with('(') => (true, rest.trim_start()),
            _ => (false, text),
        };
        let inner = text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .ok_or_else(|| self.error(format!("invalid guard condition '{}'", text), loc))?;
        let inner = inner.replace("default()", if default { "true" } else { "false" });

        let scope = Scope { frames: &self.frames, top };
        let eval = |t: &str| value::evaluate(t, &scope).map_err(|m| self.error(m, loc));
        let holds = match find_comparison(&inner) {
            Some((at, op)) => compare(op, &eval(&inner[..at])?, &eval(&inner[at + op.len()..])?),
            None => eval(&inner)?.is_true(),
        };
        Ok(holds != negate)
    }

    fn import(&mut self, import: &Import, ctx: &Context) -> Result<(), LessError> {
        let loc = import.loc;
        let raw = self.interpolate(&import.path, loc)?;
        let (path_text, is_url) = match raw.strip_prefix("url(").and_then(|r| r.strip_suffix(')')) {
            Some(inner) => (unquote(inner.trim()), true),
            None => (unquote(&raw), false),
        };

        let options = import.options;
        let is_css = options.css
            || is_url
            || path_text.ends_with(".css")
            || path_text.starts_with("http://")
            || path_text.starts_with("https://")
            || path_text.starts_with("//");
        if is_css && !options.less && !options.inline {
            if self.reference_depth == 0 {
                let media = self.substitute(&import.media, loc)?;
                let line = if media.is_empty() {
                    format!("@import {};", raw)
                } else {
                    format!("@import {} {};", raw, media)
                };
                self.head.push(line);
            }
            return Ok(());
        }

        let Some(path) = self.resolve_import(path_text, loc) else {
            if options.optional {
                debug!(import = path_text, "optional import not found");
                return Ok(());
            }
            return Err(self.error(format!("file '{}' not found", path_text), loc));
        };

        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if !options.multiple && !self.imported.insert(key) {
            debug!(path = %path.display(), "skipping repeated import");
            return Ok(());
        }

        let text = fs::read_to_string(&path)
            .map_err(|e| self.error(format!("cannot read '{}': {}", path.display(), e), loc))?;

        let mut inner = ctx.clone();
        if !import.media.is_empty() {
            let media = self.substitute(&import.media, loc)?;
            inner.wrappers.push(Wrapper { name: "media".to_string(), prelude: media, id: 0 });
            inner.target = None;
        }

        if options.inline {
            if self.reference_depth == 0 {
                self.push_block(inner.wrappers, BlockKind::Raw(text.trim_end().to_string()));
            }
            return Ok(());
        }

        let display = path.display().to_string();
        let source = self.sources.add(text, vec![SourceSpan { start: 0, path, display }]);
        let nodes = parser::parse(self.sources.text(source), source).map_err(|e| self.parse_error(e))?;

        if options.reference {
            self.reference_depth += 1;
        }
        let result = self.eval_nodes(&nodes, &inner);
        if options.reference {
            self.reference_depth -= 1;
        }
        result
    }

    /// `~path` resolves in the vendor directory; other paths relative to the
    /// importing file first, then the vendor directory. `.less` is added
    /// when the path has no extension.
    fn resolve_import(&self, path_text: &str, loc: Loc) -> Option<PathBuf> {
        let with_extension = |p: PathBuf| {
            if p.extension().is_none() {
                p.with_extension("less")
            } else {
                p
            }
        };

        if let Some(vendored) = path_text.strip_prefix('~') {
            let path = with_extension(self.options.vendor_dir.join(vendored.trim_start_matches('/')));
            return path.is_file().then_some(path);
        }

        let relative = Path::new(path_text);
        let mut candidates = Vec::new();
        if relative.is_absolute() {
            candidates.push(relative.to_path_buf());
        } else {
            if let Some(dir) = self.sources.directory(loc) {
                candidates.push(dir.join(relative));
            }
            candidates.push(relative.to_path_buf());
            candidates.push(self.options.vendor_dir.join(relative));
        }
        candidates.into_iter().map(with_extension).find(|p| p.is_file())
    }

    /// Add extending selectors to every block whose selectors match.
    /// Matched blocks from reference imports become visible with only the
    /// extending selectors.
    fn apply_extends(&mut self) {
        let extends = std::mem::take(&mut self.extends);
        for extend in &extends {
            for block in &mut self.blocks {
                let BlockKind::Rule { selectors, .. } = &mut block.kind else {
                    continue;
                };
                let mut added = Vec::new();
                for selector in selectors.iter() {
                    if extend.all {
                        if selector.contains(&extend.target) {
                            for extender in &extend.extenders {
                                added.push(selector.replace(&extend.target, extender));
                            }
                        }
                    } else if *selector == extend.target {
                        added.extend(extend.extenders.iter().cloned());
                    }
                }
                if added.is_empty() {
                    continue;
                }
                if !block.visible {
                    selectors.clear();
                    block.visible = true;
                }
                for selector in added {
                    if !selectors.contains(&selector) {
                        selectors.push(selector);
                    }
                }
            }
        }
    }
}

fn collect_definitions(body: &[Node], name: &str, out: &mut Vec<Callable>) {
    for node in body {
        match node {
            Node::Mixin(def) if def.name == name => out.push(Callable::Mixin(def.clone())),
            Node::Rule(rule) if split_top_level(&rule.selector, b',').iter().any(|s| s.trim() == name) => {
                out.push(Callable::Ruleset(rule.clone()))
            }
            _ => {}
        }
    }
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

/// Split a guard alternative at top-level ` and `.
fn split_and(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 && i >= start && text[i..].starts_with(" and ") => {
                parts.push(&text[start..i]);
                start = i + " and ".len();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

const COMPARISONS: [&str; 7] = [">=", "=<", "<=", "=>", ">", "<", "="];

fn find_comparison(text: &str) -> Option<(usize, &'static str)> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, b) in text.bytes().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b'>' | b'<' | b'=' if depth == 0 => {
                    return COMPARISONS.iter().find(|op| text[i..].starts_with(*op)).map(|op| (i, *op));
                }
                _ => {}
            },
        }
    }
    None
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    if let (Some((a, _)), Some((b, _))) = (left.as_number(), right.as_number()) {
        return match op {
            ">" => a > b,
            "<" => a < b,
            ">=" | "=>" => a >= b,
            "<=" | "=<" => a <= b,
            _ => (a - b).abs() < 1e-9,
        };
    }
    if op != "=" {
        return false;
    }
    if let (Some(a), Some(b)) = (left.as_color(), right.as_color()) {
        return (a.r, a.g, a.b, a.alpha) == (b.r, b.g, b.b, b.alpha);
    }
    left.to_interpolated() == right.to_interpolated()
}

fn normalize_selector(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join a child selector list onto its parents. `&` stands for the parent;
/// without it the child is a descendant.
fn combine_selectors(parents: &[String], child: &str) -> Vec<String> {
    let parts: Vec<String> = split_top_level(child, b',')
        .into_iter()
        .map(normalize_selector)
        .filter(|p| !p.is_empty())
        .collect();

    if parents.is_empty() {
        return parts.into_iter().map(|p| normalize_selector(&p.replace('&', ""))).collect();
    }

    let mut out = Vec::with_capacity(parents.len() * parts.len());
    for parent in parents {
        for part in &parts {
            if part.contains('&') {
                out.push(part.replace('&', parent));
            } else {
                out.push(format!("{} {}", parent, part));
            }
        }
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn print(head: &[String], blocks: &[Block]) -> String {
    let mut out = String::new();
    for line in head {
        out.push_str(line);
        out.push('\n');
    }

    let mut open: Vec<&Wrapper> = Vec::new();
    for block in blocks.iter().filter(|b| b.visible && !b.is_empty()) {
        let common = open.iter().zip(block.wrappers.iter()).take_while(|&(a, b)| *a == b).count();
        while open.len() > common {
            open.pop();
            indent(&mut out, open.len());
            out.push_str("}\n");
        }
        for wrapper in &block.wrappers[common..] {
            indent(&mut out, open.len());
            out.push('@');
            out.push_str(&wrapper.name);
            if !wrapper.prelude.is_empty() {
                out.push(' ');
                out.push_str(&wrapper.prelude);
            }
            out.push_str(" {\n");
            open.push(wrapper);
        }

        let depth = open.len();
        match &block.kind {
            BlockKind::Rule { selectors, decls } if selectors.is_empty() => {
                for decl in decls {
                    indent(&mut out, depth);
                    out.push_str(decl);
                    out.push_str(";\n");
                }
            }
            BlockKind::Rule { selectors, decls } => {
                for (i, selector) in selectors.iter().enumerate() {
                    indent(&mut out, depth);
                    out.push_str(selector);
                    out.push_str(if i + 1 == selectors.len() { " {\n" } else { ",\n" });
                }
                for decl in decls {
                    indent(&mut out, depth + 1);
                    out.push_str(decl);
                    out.push_str(";\n");
                }
                indent(&mut out, depth);
                out.push_str("}\n");
            }
            BlockKind::Raw(text) => {
                indent(&mut out, depth);
                out.push_str(text);
                out.push('\n');
            }
        }
    }
    while open.pop().is_some() {
        indent(&mut out, open.len());
        out.push_str("}\n");
    }
    out
}
