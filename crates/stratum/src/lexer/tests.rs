// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use super::*;

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source, "test.stm")
        .unwrap()
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn test_plain_text_is_one_raw_token() {
    let tokens = tokenize("hello world", "test.stm").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Raw);
    assert_eq!(tokens[0].text, "hello world");
    assert_eq!(tokens[0].grammar, Grammar::Html);
}

#[test]
fn test_tag_with_attributes() {
    assert_eq!(
        kinds(r#"<a href="/x" target=_blank hidden>go</a>"#),
        vec![
            TokenKind::TagOpen("a".into()),
            TokenKind::AttrName("href".into()),
            TokenKind::AttrValueStart('"'),
            TokenKind::Raw,
            TokenKind::AttrValueEnd,
            TokenKind::AttrName("target".into()),
            TokenKind::AttrUnquoted("_blank".into()),
            TokenKind::AttrName("hidden".into()),
            TokenKind::TagEnd,
            TokenKind::Raw,
            TokenKind::TagClose("a".into()),
        ]
    );
}

#[test]
fn test_self_closing_and_namespaced_tags() {
    assert_eq!(
        kinds("<extends:layout.base title='Home'/>"),
        vec![
            TokenKind::TagOpen("extends:layout.base".into()),
            TokenKind::AttrName("title".into()),
            TokenKind::AttrValueStart('\''),
            TokenKind::Raw,
            TokenKind::AttrValueEnd,
            TokenKind::TagSelfClose,
        ]
    );
}

#[test]
fn test_echo_inside_attribute_value() {
    let tokens = tokenize(r#"<img src="/img/{{ user.avatar }}.png">"#, "test.stm").unwrap();
    let echo = tokens
        .iter()
        .find(|t| matches!(t.kind, TokenKind::Echo { .. }))
        .unwrap();
    assert_eq!(
        echo.kind,
        TokenKind::Echo {
            expr: "user.avatar".into(),
            escape: true
        }
    );
    assert_eq!(echo.grammar, Grammar::Dynamic);
    assert_eq!(tokens.last().unwrap().kind, TokenKind::TagEnd);
}

#[test]
fn test_raw_echo_and_comment() {
    assert_eq!(
        kinds("{!! html !!}{{-- gone --}}x"),
        vec![
            TokenKind::Echo {
                expr: "html".into(),
                escape: false
            },
            TokenKind::Raw,
        ]
    );
}

#[test]
fn test_directives() {
    let tokens = tokenize("@if(user.admin) yes @else no @endif", "test.stm").unwrap();
    assert_eq!(
        tokens[0].kind,
        TokenKind::Directive {
            name: "if".into(),
            body: Some("user.admin".into())
        }
    );
    assert_eq!(
        tokens[2].kind,
        TokenKind::Directive {
            name: "else".into(),
            body: None
        }
    );
    assert_eq!(
        tokens[4].kind,
        TokenKind::Directive {
            name: "endif".into(),
            body: None
        }
    );
}

#[test]
fn test_email_is_not_a_directive() {
    let tokens = tokenize("mail me@example.com", "test.stm").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].text, "mail me@example.com");
}

#[test]
fn test_escapes() {
    let tokens = tokenize("@@handle and @{{ literal", "test.stm").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].text, "@handle and {{ literal");
}

#[test]
fn test_inline_block_and_host_code() {
    let tokens = tokenize("<title>${title|Home}</title><?lua local x = 1 ?>", "test.stm").unwrap();
    assert!(tokens.iter().any(|t| t.kind
        == TokenKind::Inline {
            name: "title".into(),
            default: Some("Home".into())
        }
        && t.grammar == Grammar::Inline));
    let host = tokens.last().unwrap();
    assert_eq!(host.kind, TokenKind::Host(" local x = 1 ".into()));
    assert_eq!(host.grammar, Grammar::Host);
}

#[test]
fn test_script_body_is_raw() {
    let tokens = tokenize("<script>if (a < b) { x = `${a}` }</script>", "test.stm").unwrap();
    assert_eq!(tokens[0].kind, TokenKind::TagOpen("script".into()));
    assert_eq!(tokens[1].kind, TokenKind::TagEnd);
    assert_eq!(tokens[2].kind, TokenKind::Raw);
    assert_eq!(tokens[2].text, "if (a < b) { x = `${a}` }");
    assert_eq!(tokens[3].kind, TokenKind::TagClose("script".into()));
}

#[test]
fn test_line_numbers() {
    let tokens = tokenize("a\nb\n{{ c }}\n<p>", "test.stm").unwrap();
    let echo = tokens
        .iter()
        .find(|t| matches!(t.kind, TokenKind::Echo { .. }))
        .unwrap();
    assert_eq!(echo.line, 3);
    assert_eq!(tokens.last().unwrap().line, 4);
}

#[test]
fn test_host_grammar_start() {
    let tokens = Lexer::new("return 1", "t.lua").tokenize(Grammar::Host).unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].kind, TokenKind::Host("return 1".into()));
}

#[test]
fn test_dynamic_grammar_start_ignores_tags() {
    let tokens = Lexer::new("<b>{{ x }}</b>", "t.stm").tokenize(Grammar::Dynamic).unwrap();
    assert_eq!(tokens[0].kind, TokenKind::Raw);
    assert_eq!(tokens[0].text, "<b>");
    assert!(matches!(tokens[1].kind, TokenKind::Echo { .. }));
}

#[test]
fn test_unterminated_regions_fail_with_position() {
    for (source, line) in [
        ("ok\n<?lua x = 1", 2),
        ("{{ x", 1),
        ("a\n\n@route('home'", 3),
        ("<div class=\"x>", 1),
        ("<div", 1),
        ("x\n<!-- open", 2),
    ] {
        match tokenize(source, "bad.stm") {
            Err(StratumError::LexError { file, line: l, .. }) => {
                assert_eq!(file, "bad.stm");
                assert_eq!(l, line, "source: {source:?}");
            }
            other => panic!("expected lex error for {source:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_unexpected_character_in_tag() {
    assert!(matches!(
        tokenize("<div =x>", "bad.stm"),
        Err(StratumError::LexError { .. })
    ));
}
