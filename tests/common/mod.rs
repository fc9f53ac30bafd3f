//! Shared test helpers for integration tests
//!
//! Note: Functions may appear unused because each test file compiles separately.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use keyloop::editor::{
    Answer, CommandContext, Editor, Host, Nav, PromptParams, View, ViewId, ViewKind, Views,
};
use keyloop::keymap::{Chord, InitPhase, KeyCode};
use keyloop::terminal::{ScriptedTerminal, Terminal};

/// One recorded command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub chord: Chord,
    pub numeric: Vec<u64>,
    pub wildcard: Vec<char>,
    pub arg: Option<String>,
    pub batch: Vec<Chord>,
    pub view: Option<ViewId>,
    pub user_input: bool,
}

impl Call {
    fn from_ctx(ctx: &CommandContext<'_, TestHost>) -> Self {
        Self {
            name: ctx.editor.commands.name(ctx.command).unwrap_or("?").to_string(),
            chord: ctx.chord,
            numeric: ctx.numeric_args().to_vec(),
            wildcard: ctx.wildcard_args().to_vec(),
            arg: ctx.static_arg().map(str::to_string),
            batch: ctx.batch.to_vec(),
            view: ctx.view,
            user_input: ctx.is_user_input,
        }
    }
}

/// Host that keeps plain string buffers and records everything it is asked
#[derive(Debug, Default)]
pub struct TestHost {
    pub buffers: HashMap<ViewId, String>,
    pub calls: Vec<Call>,
    pub answers: Vec<Option<Answer>>,
    pub errors: Vec<String>,
    pub navs: Vec<(ViewId, Nav)>,
    pub resizes: Vec<(u16, u16)>,
    pub opened: Vec<(ViewId, ViewKind)>,
    pub closed: Vec<ViewId>,
    pub completions: Vec<String>,
    pub hooks: Vec<InitPhase>,
    pub proc_output: String,
    pub proc_closed: usize,
    pub displays: usize,
    pub shutdowns: usize,
}

impl Host for TestHost {
    fn display(&mut self, _views: &Views) {
        self.displays += 1;
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.resizes.push((width, height));
    }

    fn view_opened(&mut self, view: &View) {
        self.opened.push((view.id(), view.kind()));
        self.buffers.insert(view.id(), String::new());
    }

    fn view_closed(&mut self, view: &View) {
        self.closed.push(view.id());
        self.buffers.remove(&view.id());
    }

    fn buffer_text(&self, view: ViewId) -> String {
        self.buffers.get(&view).cloned().unwrap_or_default()
    }

    fn set_buffer_text(&mut self, view: ViewId, text: &str) {
        self.buffers.insert(view, text.to_string());
    }

    fn cursor_line(&self, view: ViewId) -> Option<String> {
        self.buffers.get(&view)?.lines().last().map(str::to_string)
    }

    fn navigate(&mut self, view: ViewId, nav: Nav) {
        self.navs.push((view, nav));
    }

    fn complete(&mut self, term: &str) -> Vec<String> {
        self.completions
            .iter()
            .filter(|c| c.starts_with(term))
            .cloned()
            .collect()
    }

    fn shutdown(&mut self, _views: &Views) {
        self.shutdowns += 1;
    }
}

pub type Ctx<'a> = CommandContext<'a, TestHost>;

/// Record the call and nothing else
pub fn record(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let call = Call::from_ctx(ctx);
    ctx.editor.host.calls.push(call);
    Ok(())
}

/// `insert_data`: append the batch's plain characters to the view's buffer
pub fn insert_text(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let text: String = ctx
        .batch
        .iter()
        .filter_map(|c| match c.key {
            KeyCode::Char(ch) if c.mods.is_empty() => Some(ch),
            _ => None,
        })
        .collect();
    if let Some(view) = ctx.view {
        ctx.editor.host.buffers.entry(view).or_default().push_str(&text);
    }
    record(ctx)
}

fn push_answer(ctx: &mut Ctx<'_>, answer: Result<Option<Answer>, keyloop::DispatchError>) {
    match answer {
        Ok(answer) => ctx.editor.host.answers.push(answer),
        Err(e) => ctx.editor.host.errors.push(e.to_string()),
    }
}

/// Open a line prompt and record its answer; the call is recorded after
/// the prompt returns
pub fn ask(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let answer = ctx.editor.prompt("ask:", PromptParams::default());
    push_answer(ctx, answer);
    record(ctx)
}

pub fn ask_yn(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let answer = ctx.editor.prompt_yes_no("sure?", false);
    push_answer(ctx, answer);
    Ok(())
}

pub fn ask_yna(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let answer = ctx.editor.prompt_yes_no("all?", true);
    push_answer(ctx, answer);
    Ok(())
}

pub fn ask_ok(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let result = ctx.editor.prompt_ok("done.");
    push_answer(ctx, result.map(|()| None));
    Ok(())
}

pub fn ask_isearch(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let answer = ctx.editor.prompt_isearch("isearch:");
    push_answer(ctx, answer);
    Ok(())
}

/// Modal menu over "one\ntwo"; the answer is the picked line
pub fn ask_menu(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let answer = ctx
        .editor
        .prompt_menu("pick:", Some("one\ntwo"), None)
        .map(|line| line.map(Answer::Text));
    push_answer(ctx, answer);
    Ok(())
}

/// Non-modal menu whose submit runs `picked`
pub fn open_list(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    let callback = ctx.editor.commands.id("picked");
    ctx.editor.open_menu(callback, Some("one\ntwo"), None)?;
    Ok(())
}

pub fn failing(_ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    anyhow::bail!("this command always fails")
}

/// Count invocations in the command's udata slot
pub fn counter(ctx: &mut Ctx<'_>) -> anyhow::Result<()> {
    match ctx.udata_mut::<u32>() {
        Some(n) => *n += 1,
        None => ctx.set_udata(1u32),
    }
    Ok(())
}

pub fn hook(
    editor: &mut Editor<TestHost>,
    _id: keyloop::CommandId,
    phase: InitPhase,
) -> anyhow::Result<()> {
    editor.host.hooks.push(phase);
    Ok(())
}

/// Editor over `term` with the test commands bound and a short proc wait
pub fn editor(term: ScriptedTerminal) -> Editor<TestHost> {
    editor_on(Box::new(term))
}

pub fn editor_on(term: Box<dyn Terminal>) -> Editor<TestHost> {
    let mut ed = Editor::new(TestHost::default(), term).expect("editor should build");
    ed.commands.bind("insert_data", insert_text);
    ed.commands.bind("ask", ask);
    ed.commands.bind("ask_yn", ask_yn);
    ed.commands.bind("ask_yna", ask_yna);
    ed.commands.bind("ask_ok", ask_ok);
    ed.commands.bind("ask_isearch", ask_isearch);
    ed.commands.bind("ask_menu", ask_menu);
    ed.commands.bind("open_list", open_list);
    ed.commands.bind("picked", record);
    ed.commands.bind("failing", failing);
    ed.commands.bind("counter", counter);
    ed.set_aproc_wait(Duration::from_millis(20));
    ed
}

/// Open and focus an edit view, as `run` would
pub fn open_main(ed: &mut Editor<TestHost>) -> ViewId {
    let view = ed.open_view(ViewKind::Edit);
    ed.set_active(view).expect("fresh view should take focus");
    view
}

/// Bind `pattern` to `command` in the named keymap
pub fn bind(ed: &mut Editor<TestHost>, keymap: &str, pattern: &str, command: &str) {
    bind_arg(ed, keymap, pattern, command, None);
}

pub fn bind_arg(
    ed: &mut Editor<TestHost>,
    keymap: &str,
    pattern: &str,
    command: &str,
    arg: Option<&str>,
) {
    let id = ed.keymaps.require(keymap).expect("keymap should exist");
    let cmd = ed.commands.register(command);
    ed.keymaps
        .bind(id, pattern, cmd, arg)
        .expect("pattern should parse");
}

/// Bind `pattern` to a recording command called `command`
pub fn bind_recorded(ed: &mut Editor<TestHost>, keymap: &str, pattern: &str, command: &str) {
    ed.commands.bind(command, record);
    bind(ed, keymap, pattern, command);
}

/// Keys typed one at a time (never batched)
pub fn typed(pattern: &str) -> ScriptedTerminal {
    ScriptedTerminal::new().typed(pattern).expect("valid key pattern")
}

pub fn calls<'a>(ed: &'a Editor<TestHost>, name: &str) -> Vec<&'a Call> {
    ed.host.calls.iter().filter(|c| c.name == name).collect()
}

pub fn text(ed: &Editor<TestHost>, view: ViewId) -> String {
    ed.host.buffer_text(view)
}

pub fn chords(pattern: &str) -> Vec<Chord> {
    keyloop::keymap::parse_sequence(pattern).expect("valid key pattern")
}
