//! End-to-end tokenization scenarios over small inline grammars.

use std::sync::Arc;

use tmscope::{Grammar, GrammarRegistry, Tokenizer, TokenizerOptions, TokenizeError};

fn grammar(body: &str) -> Grammar {
    let doc = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
<key>scopeName</key><string>source.test</string>
{body}
</dict>
</plist>"#
    );
    Grammar::parse(doc.as_bytes()).expect("inline grammar must parse")
}

fn tokenizer() -> Tokenizer {
    Tokenizer::new(Arc::new(GrammarRegistry::new()))
}

fn number_grammar() -> Grammar {
    grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>name</key><string>constant.numeric</string>
              <key>match</key><string>\d+</string>
            </dict>
          </array>",
    )
}

#[test]
fn simple_match() {
    let g = number_grammar();
    let tree = tokenizer().tokenize(&g, "abc 42 xy").unwrap();
    assert_eq!(tree.root.name, "source.test");
    assert_eq!(tree.root.children.len(), 1);
    let node = &tree.root.children[0];
    assert_eq!(node.name, "constant.numeric");
    assert_eq!(node.range, 4..6);
    assert_eq!(tree.lexeme(node), "42");
}

#[test]
fn range_spans_begin_to_end() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>name</key><string>comment.block</string>
              <key>begin</key><string>/\*</string>
              <key>end</key><string>\*/</string>
            </dict>
          </array>",
    );
    let tree = tokenizer().tokenize(&g, "a /* x */ b").unwrap();
    assert_eq!(tree.root.children.len(), 1);
    let node = &tree.root.children[0];
    assert_eq!(node.name, "comment.block");
    assert_eq!(node.range, 2..9);
    assert_eq!(tree.lexeme(node), "/* x */");
}

#[test]
fn nested_pattern_inside_range() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>name</key><string>comment.block</string>
              <key>begin</key><string>/\*</string>
              <key>end</key><string>\*/</string>
              <key>patterns</key><array>
                <dict>
                  <key>name</key><string>keyword.todo</string>
                  <key>match</key><string>TODO</string>
                </dict>
              </array>
            </dict>
          </array>",
    );
    let tree = tokenizer().tokenize(&g, "/* TODO fix */").unwrap();
    assert_eq!(tree.root.children.len(), 1);
    let outer = &tree.root.children[0];
    assert_eq!(outer.range, 0..14);
    assert_eq!(outer.children.len(), 1);
    let todo = &outer.children[0];
    assert_eq!(todo.name, "keyword.todo");
    assert_eq!(todo.range, 3..7);
    assert_eq!(tree.lexeme(todo), "TODO");
}

#[test]
fn capture_groups_become_siblings() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>match</key><string>(foo)(bar)</string>
              <key>captures</key><dict>
                <key>1</key><dict><key>name</key><string>a.scope</string></dict>
                <key>2</key><dict><key>name</key><string>b.scope</string></dict>
              </dict>
            </dict>
          </array>",
    );
    let tree = tokenizer().tokenize(&g, "foobar").unwrap();
    assert_eq!(tree.root.children.len(), 1);
    let node = &tree.root.children[0];
    assert_eq!(node.children.len(), 2);
    assert_eq!(node.children[0].name, "a.scope");
    assert_eq!(node.children[0].range, 0..3);
    assert_eq!(node.children[1].name, "b.scope");
    assert_eq!(node.children[1].range, 3..6);
}

#[test]
fn unterminated_range_stops_at_newline() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>name</key><string>angle.block</string>
              <key>begin</key><string>&lt;&lt;</string>
              <key>end</key><string>&gt;&gt;</string>
            </dict>
          </array>",
    );
    let tree = tokenizer().tokenize(&g, "xx <<yy\nzz").unwrap();
    assert_eq!(tree.root.children.len(), 1);
    assert_eq!(tree.root.children[0].range, 3..7);
}

#[test]
fn zero_width_matches_hit_the_iteration_ceiling() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>name</key><string>pad</string>
              <key>match</key><string>x*</string>
            </dict>
          </array>",
    );
    let err = tokenizer().tokenize(&g, "aaaa").unwrap_err();
    assert!(matches!(
        err,
        TokenizeError::IterationLimitExceeded { limit: 10_000 }
    ));
}

#[test]
fn iteration_ceiling_is_configurable() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict><key>match</key><string>x*</string></dict>
          </array>",
    );
    let t = Tokenizer::with_options(
        Arc::new(GrammarRegistry::new()),
        TokenizerOptions { max_iterations: 7 },
    );
    let err = t.tokenize(&g, "aaaa").unwrap_err();
    assert!(matches!(
        err,
        TokenizeError::IterationLimitExceeded { limit: 7 }
    ));
}

#[test]
fn newline_fast_path_skips_to_the_matching_line() {
    let g = number_grammar();
    let tree = tokenizer().tokenize(&g, "abc\r\n42 x\n7").unwrap();
    let ranges: Vec<_> = tree.root.children.iter().map(|n| n.range.clone()).collect();
    assert_eq!(ranges, vec![5..7, 10..11]);
}

#[test]
fn ranges_are_rune_offsets_for_multibyte_input() {
    let g = number_grammar();
    let tree = tokenizer().tokenize(&g, "日本 42 語").unwrap();
    assert_eq!(tree.root.children.len(), 1);
    let node = &tree.root.children[0];
    assert_eq!(node.range, 3..5);
    assert_eq!(tree.lexeme(node), "42");
}

#[test]
fn tokenizing_twice_is_deterministic() {
    let g = grammar(
        r"<key>patterns</key><array>
            <dict>
              <key>name</key><string>comment.block</string>
              <key>begin</key><string>/\*</string>
              <key>end</key><string>\*/</string>
              <key>patterns</key><array>
                <dict><key>name</key><string>keyword.todo</string><key>match</key><string>TODO</string></dict>
              </array>
            </dict>
            <dict><key>name</key><string>constant.numeric</string><key>match</key><string>\d+</string></dict>
          </array>",
    );
    let t = tokenizer();
    let input = "1 /* TODO a */ 22\n/* open 3";
    let first = t.tokenize(&g, input).unwrap();
    let second = t.tokenize(&g, input).unwrap();
    assert_eq!(first.root, second.root);
}

#[test]
fn clones_tokenize_independently() {
    let g = number_grammar();
    let copy = g.clone();
    let t = tokenizer();
    let input = "a 1 b 22 c";
    let original_tree = t.tokenize(&g, input).unwrap();
    let clone_tree = t.tokenize(&copy, input).unwrap();
    assert_eq!(original_tree.root, clone_tree.root);
    // The original is unaffected by passes run against the clone.
    let again = t.tokenize(&g, input).unwrap();
    assert_eq!(original_tree.root, again.root);
}

#[test]
fn empty_input_yields_an_empty_root() {
    let g = number_grammar();
    let tree = tokenizer().tokenize(&g, "").unwrap();
    assert_eq!(tree.root.range, 0..0);
    assert!(tree.root.children.is_empty());
}

#[test]
fn root_range_covers_all_children() {
    let g = number_grammar();
    let tree = tokenizer().tokenize(&g, "1 and 23 and 456").unwrap();
    assert_eq!(tree.root.children.len(), 3);
    assert_eq!(tree.root.range, 0..16);
}
