use anyhow::Result;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

use crossterm::{cursor, queue, style, terminal};

use keyloop::aproc::ProcEvent;
use keyloop::cli::CliArgs;
use keyloop::editor::{
    CommandContext, DispatchError, Editor, Host, Nav, PromptParams, View, ViewId, Views,
};
use keyloop::keymap::{CommandRegistry, KeyCode};
use keyloop::signals::{self, ShutdownFlag};
use keyloop::terminal::{CrosstermTerminal, ScriptedTerminal, Terminal};
use keyloop::{config_paths, Answer, EditorConfig};

/// How long a `shell` command may keep streaming into its menu
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// A plain line buffer with a single cursor
#[derive(Debug, Clone)]
struct Buffer {
    lines: Vec<String>,
    row: usize,
    /// Column in chars
    col: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
        }
    }
}

impl Buffer {
    fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn set_text(&mut self, text: &str) {
        self.lines = text.split('\n').map(str::to_string).collect();
        self.row = self.lines.len() - 1;
        self.col = self.line_len(self.row);
    }

    fn line(&self) -> &str {
        &self.lines[self.row]
    }

    fn line_len(&self, row: usize) -> usize {
        self.lines[row].chars().count()
    }

    fn byte_at(&self, row: usize, col: usize) -> usize {
        self.lines[row]
            .char_indices()
            .nth(col)
            .map_or(self.lines[row].len(), |(i, _)| i)
    }

    fn insert_char(&mut self, c: char) {
        if c == '\n' {
            let at = self.byte_at(self.row, self.col);
            let rest = self.lines[self.row].split_off(at);
            self.row += 1;
            self.lines.insert(self.row, rest);
            self.col = 0;
            return;
        }
        let at = self.byte_at(self.row, self.col);
        self.lines[self.row].insert(at, c);
        self.col += 1;
    }

    fn insert_str(&mut self, s: &str) {
        s.chars().for_each(|c| self.insert_char(c));
    }

    fn append(&mut self, s: &str) {
        self.row = self.lines.len() - 1;
        self.col = self.line_len(self.row);
        self.insert_str(s);
    }

    fn delete_before(&mut self) {
        if self.col > 0 {
            self.col -= 1;
            let at = self.byte_at(self.row, self.col);
            self.lines[self.row].remove(at);
        } else if self.row > 0 {
            let line = self.lines.remove(self.row);
            self.row -= 1;
            self.col = self.line_len(self.row);
            self.lines[self.row].push_str(&line);
        }
    }

    fn delete_after(&mut self) {
        if self.col < self.line_len(self.row) {
            let at = self.byte_at(self.row, self.col);
            self.lines[self.row].remove(at);
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
        }
    }

    fn move_rows(&mut self, delta: isize) {
        let last = self.lines.len() - 1;
        self.row = self.row.saturating_add_signed(delta).min(last);
        self.col = self.col.min(self.line_len(self.row));
    }

    fn move_left(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.line_len(self.row);
        }
    }

    fn move_right(&mut self) {
        if self.col < self.line_len(self.row) {
            self.col += 1;
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
        }
    }

    fn move_word(&mut self, forward: bool) {
        let chars: Vec<char> = self.line().chars().collect();
        let is_word = |c: char| c.is_alphanumeric() || c == '_';
        if forward {
            if self.col >= chars.len() {
                return self.move_right();
            }
            let mut col = self.col;
            while col < chars.len() && is_word(chars[col]) {
                col += 1;
            }
            while col < chars.len() && !is_word(chars[col]) {
                col += 1;
            }
            self.col = col;
        } else {
            if self.col == 0 {
                return self.move_left();
            }
            let mut col = self.col;
            while col > 0 && !is_word(chars[col - 1]) {
                col -= 1;
            }
            while col > 0 && is_word(chars[col - 1]) {
                col -= 1;
            }
            self.col = col;
        }
    }

    /// Move onto the next (or previous) occurrence of `c` on this line
    fn move_until(&mut self, c: char, forward: bool) -> bool {
        let chars: Vec<char> = self.line().chars().collect();
        let found = if forward {
            (self.col + 1..chars.len()).find(|&i| chars[i] == c)
        } else {
            (0..self.col).rev().find(|&i| chars[i] == c)
        };
        found.map(|i| self.col = i).is_some()
    }

    /// Move to the next (or previous) line containing `term`
    fn search(&mut self, term: &str, forward: bool) -> bool {
        if term.is_empty() {
            return false;
        }
        let n = self.lines.len();
        let hit = (1..=n)
            .map(|step| {
                if forward {
                    (self.row + step) % n
                } else {
                    (self.row + n - step % n) % n
                }
            })
            .find(|&row| self.lines[row].contains(term));
        match hit {
            Some(row) => {
                self.row = row;
                let byte = self.lines[row].find(term).unwrap_or(0);
                self.col = self.lines[row][..byte].chars().count();
                true
            }
            None => false,
        }
    }

    /// Text of the current line between the cursor and `to`
    fn span(&self, to: &str) -> String {
        let chars: Vec<char> = self.line().chars().collect();
        let (start, end) = match to {
            "bol" => (0, self.col),
            "word" => {
                let mut end = self.col;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                (self.col, end)
            }
            _ => (self.col, chars.len()),
        };
        chars[start..end].iter().collect()
    }
}

/// View drawn in the body: the active one, or the newest non-prompt view
/// while a prompt has focus
fn body_view(views: &Views) -> Option<&View> {
    views
        .active_view()
        .filter(|v| !v.is_prompt())
        .or_else(|| views.iter().rev().find(|v| !v.is_prompt()))
}

/// Terminal line editor used by the `keyloop` binary
struct DemoHost {
    buffers: HashMap<ViewId, Buffer>,
    clipboard: String,
    status: String,
    size: (u16, u16),
    draw: bool,
    /// First edit view; printed after a headless run
    main_view: Option<ViewId>,
    prompt_view: Option<ViewId>,
}

impl DemoHost {
    fn new(size: (u16, u16), draw: bool) -> Self {
        Self {
            buffers: HashMap::new(),
            clipboard: String::new(),
            status: String::new(),
            size,
            draw,
            main_view: None,
            prompt_view: None,
        }
    }

    fn buffer(&mut self, view: Option<ViewId>) -> Result<&mut Buffer> {
        view.and_then(|v| self.buffers.get_mut(&v))
            .ok_or_else(|| anyhow::anyhow!("no buffer for the active view"))
    }

    fn render(&self, views: &Views) -> io::Result<()> {
        let (width, height) = (self.size.0 as usize, self.size.1.max(1) as usize);
        let body_rows = height - 1;
        let mut out = io::stdout().lock();
        queue!(out, terminal::Clear(terminal::ClearType::All))?;

        let body = body_view(views);
        let mut cursor_at = (0u16, 0u16);
        if let Some(buf) = body.and_then(|v| self.buffers.get(&v.id())) {
            let top = buf.row.saturating_sub(body_rows.saturating_sub(1));
            for (y, line) in buf.lines.iter().skip(top).take(body_rows).enumerate() {
                let shown: String = line.chars().take(width).collect();
                queue!(out, cursor::MoveTo(0, y as u16), style::Print(shown))?;
            }
            cursor_at = (buf.col.min(width) as u16, (buf.row - top) as u16);
        }

        let status = match views.prompt().and_then(|id| views.get(id)) {
            Some(prompt) => {
                let text = self.buffers.get(&prompt.id()).map(Buffer::text).unwrap_or_default();
                let line = format!("{} {}", prompt.prompt_str().unwrap_or(""), text);
                cursor_at = (line.chars().count().min(width) as u16, body_rows as u16);
                line
            }
            None => self.status.clone(),
        };
        let status: String = status.chars().take(width).collect();
        queue!(
            out,
            cursor::MoveTo(0, body_rows as u16),
            style::Print(status),
            cursor::MoveTo(cursor_at.0, cursor_at.1)
        )?;
        out.flush()
    }

    /// Complete a path prefix against the filesystem
    fn complete_path(term: &str) -> Vec<String> {
        let (dir, prefix) = match term.rfind('/') {
            Some(i) => (&term[..=i], &term[i + 1..]),
            None => ("", term),
        };
        let Ok(entries) = std::fs::read_dir(if dir.is_empty() { Path::new(".") } else { Path::new(dir) }) else {
            return Vec::new();
        };
        let mut found: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with(prefix))
            .map(|name| format!("{}{}", dir, name))
            .collect();
        found.sort();
        found
    }
}

impl Host for DemoHost {
    fn display(&mut self, views: &Views) {
        if !self.draw {
            return;
        }
        if let Err(e) = self.render(views) {
            tracing::warn!("Render failed: {}", e);
        }
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.size = (width, height);
    }

    fn view_opened(&mut self, view: &View) {
        self.buffers.insert(view.id(), Buffer::default());
        if view.is_prompt() {
            self.prompt_view = Some(view.id());
        } else if self.main_view.is_none() {
            self.main_view = Some(view.id());
        }
    }

    fn view_closed(&mut self, view: &View) {
        self.buffers.remove(&view.id());
        if self.prompt_view == Some(view.id()) {
            self.prompt_view = None;
        }
    }

    fn buffer_text(&self, view: ViewId) -> String {
        self.buffers.get(&view).map(Buffer::text).unwrap_or_default()
    }

    fn set_buffer_text(&mut self, view: ViewId, text: &str) {
        self.buffers.entry(view).or_default().set_text(text);
    }

    fn cursor_line(&self, view: ViewId) -> Option<String> {
        self.buffers.get(&view).map(|b| b.line().to_string())
    }

    fn navigate(&mut self, view: ViewId, nav: Nav) {
        let page = self.size.1.saturating_sub(1).max(1) as isize;
        let term = self
            .prompt_view
            .map(|p| self.buffer_text(p))
            .unwrap_or_default();
        let Some(buf) = self.buffers.get_mut(&view) else {
            return;
        };
        match nav {
            Nav::Up => buf.move_rows(-1),
            Nav::Down => buf.move_rows(1),
            Nav::PageUp => buf.move_rows(-page),
            Nav::PageDown => buf.move_rows(page),
            Nav::SearchNext | Nav::SearchPrev => {
                if !buf.search(&term, nav == Nav::SearchNext) {
                    self.status = format!("not found: {}", term);
                }
            }
            Nav::DropCursors => self.status = format!("search ended at line {}", buf.row + 1),
        }
    }

    fn complete(&mut self, term: &str) -> Vec<String> {
        Self::complete_path(term)
    }

    fn shutdown(&mut self, _views: &Views) {
        self.status = "shutting down".to_string();
        tracing::info!("Shutdown with {} open buffers", self.buffers.len());
    }
}

type Ctx<'a> = CommandContext<'a, DemoHost>;

fn insert_data(ctx: &mut Ctx<'_>) -> Result<()> {
    let text: String = ctx
        .batch
        .iter()
        .filter_map(|chord| match chord.key {
            KeyCode::Char(c) if chord.mods.is_empty() => Some(c),
            KeyCode::Enter => Some('\n'),
            KeyCode::Tab => Some('\t'),
            _ => None,
        })
        .collect();
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.insert_str(&text);
    Ok(())
}

fn delete_before(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.delete_before();
    Ok(())
}

fn delete_after(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.delete_after();
    Ok(())
}

fn move_bol(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.col = 0;
    Ok(())
}

fn move_eol(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    let buf = ctx.editor.host.buffer(view)?;
    buf.col = buf.line_len(buf.row);
    Ok(())
}

fn move_beginning(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    let buf = ctx.editor.host.buffer(view)?;
    buf.row = 0;
    buf.col = 0;
    Ok(())
}

fn move_end(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    let buf = ctx.editor.host.buffer(view)?;
    buf.row = buf.lines.len() - 1;
    buf.col = buf.line_len(buf.row);
    Ok(())
}

fn move_left(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_left();
    Ok(())
}

fn move_right(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_right();
    Ok(())
}

fn move_up(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_rows(-1);
    Ok(())
}

fn move_down(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_rows(1);
    Ok(())
}

/// `M-y <count> u|d`
fn move_relative(ctx: &mut Ctx<'_>) -> Result<()> {
    let count = ctx.numeric_args().first().copied().unwrap_or(1);
    let count = isize::try_from(count).unwrap_or(isize::MAX);
    let delta = match ctx.static_arg() {
        Some("up") => -count,
        Some("down") => count,
        other => anyhow::bail!("move_relative: bad direction {:?}", other),
    };
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_rows(delta);
    Ok(())
}

fn move_until(ctx: &mut Ctx<'_>, forward: bool) -> Result<()> {
    let Some(&target) = ctx.wildcard_args().first() else {
        anyhow::bail!("no target character");
    };
    let view = ctx.view;
    if !ctx.editor.host.buffer(view)?.move_until(target, forward) {
        ctx.editor.host.status = format!("'{}' not found", target);
    }
    Ok(())
}

fn move_until_forward(ctx: &mut Ctx<'_>) -> Result<()> {
    move_until(ctx, true)
}

fn move_until_back(ctx: &mut Ctx<'_>) -> Result<()> {
    move_until(ctx, false)
}

fn move_word_forward(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_word(true);
    Ok(())
}

fn move_word_back(ctx: &mut Ctx<'_>) -> Result<()> {
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.move_word(false);
    Ok(())
}

fn isearch(ctx: &mut Ctx<'_>) -> Result<()> {
    ctx.editor.prompt_isearch("isearch:")?;
    Ok(())
}

/// Cut the rest of the line; consecutive cuts accumulate
fn cut(ctx: &mut Ctx<'_>) -> Result<()> {
    let consecutive = ctx.loop_ctx.last_cmd == Some(ctx.command);
    let view = ctx.view;
    let buf = ctx.editor.host.buffer(view)?;
    let mut taken = buf.span("eol");
    if taken.is_empty() {
        buf.delete_after();
        taken.push('\n');
    } else {
        let at = buf.byte_at(buf.row, buf.col);
        buf.lines[buf.row].truncate(at);
    }
    if consecutive {
        ctx.editor.host.clipboard.push_str(&taken);
    } else {
        ctx.editor.host.clipboard = taken;
    }
    Ok(())
}

fn uncut(ctx: &mut Ctx<'_>) -> Result<()> {
    let text = ctx.editor.host.clipboard.clone();
    let view = ctx.view;
    ctx.editor.host.buffer(view)?.insert_str(&text);
    Ok(())
}

fn copy_by(ctx: &mut Ctx<'_>) -> Result<()> {
    let to = ctx.static_arg().unwrap_or("eol").to_string();
    let view = ctx.view;
    let text = ctx.editor.host.buffer(view)?.span(&to);
    ctx.editor.host.status = format!("copied {} chars", text.chars().count());
    ctx.editor.host.clipboard = text;
    Ok(())
}

fn redraw(ctx: &mut Ctx<'_>) -> Result<()> {
    let (width, height) = ctx.editor.terminal_size();
    ctx.editor.host.resize(width, height);
    ctx.editor.host.status.clear();
    Ok(())
}

/// Prompt for a shell command and stream its output into a menu
fn shell(ctx: &mut Ctx<'_>) -> Result<()> {
    let Some(Answer::Text(cmd)) = ctx.editor.prompt("shell:", PromptParams::default())? else {
        return Ok(());
    };
    if cmd.trim().is_empty() {
        return Ok(());
    }

    let proc_id = ctx.editor.procs.spawn_shell(
        &cmd,
        SHELL_TIMEOUT,
        Box::new(|host: &mut DemoHost, ev: &ProcEvent<'_>| {
            let Some(menu) = ev.invoker else {
                return;
            };
            if let Some(data) = ev.data {
                if let Some(buf) = host.buffers.get_mut(&menu) {
                    buf.append(&String::from_utf8_lossy(data));
                }
            }
            if ev.is_closed {
                host.status = if ev.is_error {
                    "shell: read error".to_string()
                } else {
                    "shell: done".to_string()
                };
            }
        }),
    )?;
    let pick = ctx.editor.commands.id("shell_pick");
    ctx.editor.open_menu(pick, Some(""), Some(proc_id))?;
    Ok(())
}

/// Menu callback: copy the selected output line and close the menu
fn shell_pick(ctx: &mut Ctx<'_>) -> Result<()> {
    let Some(menu) = ctx.view else {
        return Ok(());
    };
    if let Some(line) = ctx.editor.host.cursor_line(menu) {
        ctx.editor.host.status = format!("copied: {}", line);
        ctx.editor.host.clipboard = line;
    }
    ctx.editor.close_view(menu);
    Ok(())
}

fn register_commands(commands: &mut CommandRegistry<DemoHost>) {
    commands.bind("insert_data", insert_data);
    commands.bind("delete_before", delete_before);
    commands.bind("delete_after", delete_after);
    commands.bind("move_bol", move_bol);
    commands.bind("move_eol", move_eol);
    commands.bind("move_beginning", move_beginning);
    commands.bind("move_end", move_end);
    commands.bind("move_left", move_left);
    commands.bind("move_right", move_right);
    commands.bind("move_up", move_up);
    commands.bind("move_down", move_down);
    commands.bind("move_relative", move_relative);
    commands.bind("move_until_forward", move_until_forward);
    commands.bind("move_until_back", move_until_back);
    commands.bind("move_word_forward", move_word_forward);
    commands.bind("move_word_back", move_word_back);
    commands.bind("isearch", isearch);
    commands.bind("cut", cut);
    commands.bind("uncut", uncut);
    commands.bind("copy_by", copy_by);
    commands.bind("redraw", redraw);
    commands.bind("shell", shell);
    commands.bind("shell_pick", shell_pick);
}

/// Headless input: one key pattern per stdin line, each line one burst
fn scripted_stdin() -> Result<ScriptedTerminal> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let mut term = ScriptedTerminal::new();
    for line in input.lines().filter(|l| !l.trim().is_empty()) {
        term = term.keys(line)?;
    }
    Ok(term)
}

fn main() -> Result<()> {
    let args = CliArgs::parse_args();
    keyloop::tracing::init(args.log);

    let mut config = EditorConfig::load();
    args.apply_to(&mut config);
    if config.keymap_file.is_none() {
        config.keymap_file = config_paths::keymap_file().filter(|p| p.exists());
    }
    let cli_keymaps = args.keymap_config()?;

    let shutdown = ShutdownFlag::new();
    let sig_ids = shutdown.install()?;

    let terminal: Box<dyn Terminal> = if args.headless {
        Box::new(scripted_stdin()?)
    } else {
        Box::new(CrosstermTerminal::new()?.with_interrupt(shutdown.handle()))
    };
    let host = DemoHost::new(terminal.size(), !args.headless);

    let mut editor = Editor::new(host, terminal)?;
    register_commands(&mut editor.commands);
    editor.configure(&config, Some(&cli_keymaps))?;
    if let Err(e) = editor.commands.check_resolved() {
        tracing::warn!("{}", e);
    }
    editor.set_display_enabled(!args.headless);
    editor.set_shutdown_flag(shutdown);

    let result = editor.run();
    signals::uninstall(sig_ids);

    let text = editor
        .host
        .main_view
        .map(|v| editor.host.buffer_text(v))
        .unwrap_or_default();
    // Restores the terminal
    drop(editor);

    match result {
        Ok(()) | Err(DispatchError::InputClosed) => {}
        Err(e) => return Err(e.into()),
    }
    if args.headless {
        println!("{}", text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyloop::editor::ViewKind;
    use keyloop::keymap::KeyMapStack;

    fn headless(keys: &str) -> Editor<DemoHost> {
        let term = ScriptedTerminal::new().typed(keys).unwrap();
        let mut editor = Editor::new(DemoHost::new((80, 24), false), Box::new(term)).unwrap();
        register_commands(&mut editor.commands);
        editor.set_display_enabled(false);
        editor
    }

    fn main_text(editor: &Editor<DemoHost>) -> String {
        let view = editor.host.main_view.unwrap();
        editor.host.buffer_text(view)
    }

    #[test]
    fn test_headless_editing() {
        let mut editor = headless("h e l l o C-a x C-e y C-x");
        editor.run().unwrap();
        assert!(editor.is_quitting());
        assert_eq!(main_text(&editor), "xhelloy");
    }

    #[test]
    fn test_cut_and_uncut() {
        let mut editor = headless("a b C-a C-k C-u C-u C-x");
        editor.run().unwrap();
        assert_eq!(main_text(&editor), "abab");
        assert_eq!(editor.host.clipboard, "ab");
    }

    #[test]
    fn test_body_view_skips_prompt() {
        let mut views = Views::default();
        let first = views.open(ViewKind::Edit, KeyMapStack::new());
        let second = views.open(ViewKind::Edit, KeyMapStack::new());
        let prompt = views.open(ViewKind::Prompt, KeyMapStack::new());

        views.set_active(first).unwrap();
        assert_eq!(body_view(&views).map(View::id), Some(first));

        views.set_active(prompt).unwrap();
        assert_eq!(body_view(&views).map(View::id), Some(second));
    }
}
