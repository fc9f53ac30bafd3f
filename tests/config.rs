//! Configuration tests
//!
//! Editor config files, keymap YAML files, and command-line keymaps applied
//! through `Editor::configure`.

mod common;

use std::time::Duration;

use common::{calls, chords, editor, open_main, text, typed};

use keyloop::cli::CliArgs;
use keyloop::config::EditorConfig;
use keyloop::keymap::{Chord, KeyCode, KeymapError};

fn cli(args: &[&str]) -> CliArgs {
    CliArgs::try_parse_args(std::iter::once("keyloop").chain(args.iter().copied()))
        .expect("arguments should parse")
}

// ========================================================================
// Editor config
// ========================================================================

#[test]
fn test_partial_config_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "macro_toggle_key: f2\npaste_batching: false\n").unwrap();

    let config = EditorConfig::load_from(&path);
    assert_eq!(config.macro_toggle_key, "f2");
    assert!(!config.paste_batching);
    assert_eq!(config.init_keymap, "normal");
    assert_eq!(config.aproc_wait_ms, 1000);
}

#[test]
fn test_configure_applies_loop_settings() {
    let mut ed = editor(typed("C-x"));
    let config = EditorConfig {
        macro_toggle_key: "f2".to_string(),
        aproc_wait_ms: 5,
        ..EditorConfig::default()
    };

    ed.configure(&config, None).unwrap();
    assert_eq!(ed.macro_toggle(), Chord::key(KeyCode::F(2)));
}

#[test]
fn test_configure_rejects_unknown_init_keymap() {
    let mut ed = editor(typed("C-x"));
    let config = EditorConfig {
        init_keymap: "nowhere".to_string(),
        ..EditorConfig::default()
    };

    assert!(matches!(
        ed.configure(&config, None),
        Err(KeymapError::UnknownKeymap(_))
    ));
}

// ========================================================================
// Keymap files
// ========================================================================

const VI_YAML: &str = r#"
keymaps:
  - name: vi
    default: insert_data
    fallthrough: false
    bindings:
      - { command: quit, key: "q" }
      - { command: mark, key: "m" }
      - { command: mark, key: "g g", arg: "top" }
macros:
  - "twice,x,x"
"#;

#[test]
fn test_keymap_file_defines_init_keymap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vi.yaml");
    std::fs::write(&path, VI_YAML).unwrap();

    let mut ed = editor(typed("m z g g q"));
    ed.commands.bind("mark", common::record);
    let config = EditorConfig {
        init_keymap: "vi".to_string(),
        keymap_file: Some(path),
        ..EditorConfig::default()
    };
    ed.configure(&config, None).unwrap();
    ed.set_aproc_wait(Duration::from_millis(20));

    let main = open_main(&mut ed);
    ed.run().unwrap();

    let args: Vec<Option<String>> = calls(&ed, "mark").iter().map(|c| c.arg.clone()).collect();
    assert_eq!(args, vec![None, Some("top".to_string())]);
    assert_eq!(text(&ed, main), "z");
    assert_eq!(ed.macros.get("twice").unwrap().chords, chords("x x"));
}

#[test]
fn test_missing_keymap_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut ed = editor(typed("C-x"));
    let config = EditorConfig {
        keymap_file: Some(dir.path().join("absent.yaml")),
        ..EditorConfig::default()
    };

    assert!(matches!(
        ed.configure(&config, None),
        Err(KeymapError::IoError(_))
    ));
}

#[test]
fn test_keymap_file_extends_builtin_keymap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extra.yaml");
    std::fs::write(
        &path,
        "keymaps:\n  - name: normal\n    bindings:\n      - { command: mark, key: \"C-t\" }\n",
    )
    .unwrap();

    let mut ed = editor(typed("a C-t C-x"));
    ed.commands.bind("mark", common::record);
    let config = EditorConfig {
        keymap_file: Some(path),
        ..EditorConfig::default()
    };
    ed.configure(&config, None).unwrap();

    let main = open_main(&mut ed);
    ed.run().unwrap();
    assert_eq!(calls(&ed, "mark").len(), 1);
    // Existing bindings and the default survive
    assert_eq!(text(&ed, main), "a");
    assert!(ed.is_quitting());
}

// ========================================================================
// Command-line keymaps
// ========================================================================

#[test]
fn test_cli_keymaps_and_init_keymap() {
    let args = cli(&[
        "-K", "modal,0",
        "-k", "quit,C-x",
        "-k", "mark,C-t ## x,counted",
        "-K", "other,1",
        "-k", "mark,o",
        "-n", "modal",
    ]);
    let mut config = EditorConfig::default();
    args.apply_to(&mut config);
    let extra = args.keymap_config().unwrap();

    let mut ed = editor(typed("a C-t 1 2 x o C-x"));
    ed.commands.bind("mark", common::record);
    ed.configure(&config, Some(&extra)).unwrap();
    ed.set_aproc_wait(Duration::from_millis(20));

    let main = open_main(&mut ed);
    ed.run().unwrap();

    let marks = calls(&ed, "mark");
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0].numeric, vec![12]);
    assert_eq!(marks[0].arg.as_deref(), Some("counted"));
    // "modal" has no default and no fallthrough
    assert_eq!(text(&ed, main), "");
    assert!(ed.keymaps.id("other").is_some());
}

#[test]
fn test_cli_macro_and_toggle_key() {
    let args = cli(&["-M", "q,h,i", "-m", "f3"]);
    let mut config = EditorConfig::default();
    args.apply_to(&mut config);
    let extra = args.keymap_config().unwrap();

    let mut ed = editor(typed("M-m q C-x"));
    ed.configure(&config, Some(&extra)).unwrap();
    ed.set_aproc_wait(Duration::from_millis(20));

    let main = open_main(&mut ed);
    ed.run().unwrap();
    assert_eq!(ed.macro_toggle(), Chord::key(KeyCode::F(3)));
    assert_eq!(text(&ed, main), "hi");
}

#[test]
fn test_cli_binding_before_keymap_is_rejected() {
    let args = cli(&["-k", "quit,C-x", "-K", "late,1"]);
    assert!(matches!(
        args.keymap_config(),
        Err(KeymapError::InvalidDefinition(_))
    ));
}

#[test]
fn test_cli_bad_keymap_def_is_rejected() {
    let args = cli(&["-K", "broken"]);
    assert!(args.keymap_config().is_err());
}
