use super::*;
use crate::dom::{clean_text, reply_text};

fn paragraph(text: &str) -> Node {
    Node::element("p", vec![Node::text(text)])
}

#[test]
fn clean_text_inserts_newlines_before_block_elements() {
    let tree = Node::element(
        "message-content",
        vec![paragraph("first line"), paragraph("second line")],
    );
    assert_eq!(clean_text(&tree), "\nfirst line\nsecond line");
}

#[test]
fn clean_text_keeps_inline_elements_on_one_line() {
    let tree = Node::element(
        "span",
        vec![
            Node::text("a "),
            Node::element("em", vec![Node::text("b")]),
            Node::text(" c"),
        ],
    );
    assert_eq!(clean_text(&tree), "a b c");
}

#[test]
fn clean_text_skips_aria_hidden_and_ui_noise() {
    let tree = Node::element(
        "message-content",
        vec![
            Node::hidden("span", vec![Node::text("check_circle")]),
            Node::element("mat-icon", vec![Node::text("edit")]),
            Node::element("button", vec![Node::text("Copy")]),
            Node::text("visible"),
        ],
    );
    assert_eq!(clean_text(&tree), "visible");
}

#[test]
fn clean_text_skips_thought_chunks() {
    let tree = Node::element(
        "ms-chat-turn",
        vec![
            Node::element("ms-thought-chunk", vec![paragraph("internal reasoning")]),
            paragraph("the answer"),
        ],
    );
    assert_eq!(clean_text(&tree), "\nthe answer");
}

#[test]
fn clean_text_preserves_block_structure_inside_pre() {
    let tree = Node::element(
        "div",
        vec![Node::element(
            "pre",
            vec![Node::text("<tool name=\"x\">\n</tool>")],
        )],
    );
    assert_eq!(clean_text(&tree), "\n\n<tool name=\"x\">\n</tool>");
}

#[test]
fn tag_comparison_is_case_insensitive() {
    let tree = Node::element(
        "DIV",
        vec![
            Node::element("BUTTON", vec![Node::text("Run")]),
            Node::text("body"),
        ],
    );
    assert_eq!(clean_text(&tree), "\nbody");
}

#[test]
fn reply_text_strips_controls_and_trims() {
    let tree = Node::element(
        "model-response",
        vec![
            paragraph("  the reply  "),
            Node::element("button", vec![Node::text("Copy")]),
            Node::element("svg", vec![Node::text("icon-path")]),
            Node::hidden("span", vec![Node::text("thumb_up")]),
        ],
    );
    assert_eq!(reply_text(&tree), "the reply");
}

#[test]
fn reply_text_of_empty_reply_is_empty() {
    let tree = Node::element("model-response", vec![]);
    assert_eq!(reply_text(&tree), "");
}
