use ttc_parser::ast::{strip_spans, Input, Value};
use ttc_parser::ErrorKind;

use super::*;

fn sentence(s: &str) -> Vec<String> {
    s.split_whitespace().map(|t| t.to_string()).collect()
}

fn parse(source: &str) -> Input {
    ttc_parser::parse_source(source, 0).unwrap()
}

fn encode_default(input: &Input, s: &str) -> (Vec<String>, EntityDict) {
    encode(input, &sentence(s), &EncodeOptions::default()).unwrap()
}

fn assert_nn_roundtrip(source: &str, s: &str) {
    let input = parse(source);
    let (tokens, entities) = encode_default(&input, s);
    let decoded = decode(&tokens, &entities)
        .unwrap_or_else(|e| panic!("failed to decode {}: {e}", tokens.join(" ")));
    similar_asserts::assert_eq!(strip_spans(input), strip_spans(decoded), "{}", tokens.join(" "));
}

#[test]
fn test_encode_simple_command() {
    let input = parse("now => @com.xkcd.get_comic(number=42) => notify;");
    let (tokens, entities) = encode_default(&input, "get xkcd comic 42");

    assert_eq!(
        tokens,
        vec![
            "now",
            "=>",
            "@com.xkcd.get_comic",
            "param:number:Number",
            "=",
            "NUMBER_0",
            "=>",
            "notify"
        ]
    );
    assert_eq!(entities.get("NUMBER_0"), Some(&Value::number(42.0)));
}

#[test]
fn test_roundtrip_commands() {
    assert_nn_roundtrip(
        "now => @com.xkcd.get_comic(number=42) => notify;",
        "get xkcd comic 42",
    );
    assert_nn_roundtrip(
        r#"now => @com.twitter.post(status="hello world");"#,
        "tweet hello world",
    );
    assert_nn_roundtrip(
        "monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);",
        "autopost my timeline",
    );
}

#[test]
fn test_roundtrip_filters() {
    assert_nn_roundtrip(
        r#"now => @com.gmail.inbox(), labels in_array ["a", "b"] => notify;"#,
        "emails labeled a or b",
    );
    assert_nn_roundtrip(
        r#"now => @com.gmail.inbox(), subject =~ "urgent" && is_important == true => notify;"#,
        "urgent important emails",
    );
}

#[test]
fn test_roundtrip_table_operators() {
    assert_nn_roundtrip(
        "now => sort file_size asc of @com.google.drive.list_drive_files()[1:5] => notify;",
        "the 5 smallest drive files",
    );
    assert_nn_roundtrip(
        "now => aggregate count of @com.gmail.inbox() => notify;",
        "how many emails do i have",
    );
    assert_nn_roundtrip(
        "now => [text, author] of @com.twitter.home_timeline() => notify;",
        "who tweeted what",
    );
}

#[test]
fn test_roundtrip_structural_dates() {
    let input = parse("now => @com.spotify.get_song(), release_date >= new Date(2020, 4, 1) => notify;");
    let (tokens, entities) = encode_default(&input, "songs released after april 2020");

    // dates are structural tokens, not opaque placeholders
    let joined = tokens.join(" ");
    assert!(joined.contains("new Date ( 2020 , 4 , 1 )"), "{joined}");
    assert!(entities.is_empty());

    let decoded = decode(&tokens, &entities).unwrap();
    assert_eq!(strip_spans(input), strip_spans(decoded));
}

#[test]
fn test_roundtrip_timer() {
    assert_nn_roundtrip(
        "timer(base=new Date(), interval=1h) => notify;",
        "every hour remind me check 1 h",
    );
}

#[test]
fn test_roundtrip_policy() {
    assert_nn_roundtrip("true : now => @com.twitter.post;", "anyone may tweet");
    assert_nn_roundtrip(
        r#"source == "bob"^^tt:contact : @com.twitter.home_timeline => notify;"#,
        "bob may read my timeline",
    );
    assert_nn_roundtrip("true : * => *;", "anyone may do anything");
}

#[test]
fn test_roundtrip_bookkeeping() {
    assert_nn_roundtrip("bookkeeping(special(yes));", "yes");
    assert_nn_roundtrip("bookkeeping(choice(2));", "the third one");
    assert_nn_roundtrip("bookkeeping(answer(42));", "42");
}

#[test]
fn test_roundtrip_control() {
    assert_nn_roundtrip("$stop;", "stop");
}

#[test]
fn test_roundtrip_dialogue() {
    assert_nn_roundtrip(
        r#"$dialogue @org.thingpedia.dialogue.transaction.sys_recommend_one;
           now => @com.spotify.get_song() => notify;"#,
        "here is a song",
    );
}

#[test]
fn test_device_binding() {
    let input = parse(r#"now => @com.twitter(id="twitter-foo").post(status="hi");"#);
    let (tokens, entities) = encode_default(&input, "post hi on my work twitter");
    let joined = tokens.join(" ");
    assert!(joined.contains("@com.twitter ( \" twitter-foo \" : \" twitter-foo \" )"), "{joined}");

    let decoded = decode(&tokens, &entities).unwrap();
    assert_eq!(strip_spans(input), strip_spans(decoded));
}

#[test]
fn test_unmatched_literal_is_an_error() {
    let input = parse(r#"now => @com.twitter.post(status="hello world");"#);
    let err = encode(&input, &sentence("tweet something else"), &EncodeOptions::default())
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnmatchedLiteral);
}

#[test]
fn test_sequential_mode_needs_no_match() {
    let input = parse(r#"now => @com.twitter.post(status="hello world");"#);
    let options = EncodeOptions {
        mode: AllocationMode::Sequential,
        ..EncodeOptions::default()
    };
    let (tokens, entities) = encode(&input, &sentence("tweet something else"), &options).unwrap();
    assert!(tokens.contains(&"QUOTED_STRING_0".to_string()));
    assert_eq!(entities.len(), 1);
}

#[test]
fn test_allocation_order_differs_between_modes() {
    // program mentions "dog" before "cat"; the sentence mentions cat first
    let source = r#"now => @com.yandex.translate(text="dog") join @com.yandex.translate() on (text="cat") => notify;"#;
    let s = "translate cat and dog";

    let input = parse(source);
    let (_, consecutive) = encode_default(&input, s);
    assert_eq!(
        consecutive.get("QUOTED_STRING_0"),
        Some(&Value::string("cat"))
    );

    let options = EncodeOptions {
        mode: AllocationMode::Sequential,
        ..EncodeOptions::default()
    };
    let (_, sequential) = encode(&input, &sentence(s), &options).unwrap();
    assert_eq!(
        sequential.get("QUOTED_STRING_0"),
        Some(&Value::string("dog"))
    );
}

#[test]
fn test_slots() {
    let input = parse("now => @com.twitter.post(status=$undefined);");
    let options = EncodeOptions {
        allocate_slots: true,
        ..EncodeOptions::default()
    };
    let (tokens, _) = encode(&input, &sentence("tweet something"), &options).unwrap();
    assert!(tokens.contains(&"SLOT_0".to_string()));

    // and without slot allocation, the keyword is used
    let (tokens, _) = encode_default(&input, "tweet something");
    assert!(tokens.contains(&"undefined".to_string()));
}

#[test]
fn test_invalid_nn_syntax() {
    let tokens = sentence("now => banana ( nope");
    let err = decode(&tokens, &EntityDict::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidNNSyntax);

    // a placeholder missing from the dictionary is also fatal
    let tokens = sentence("now => @com.xkcd.get_comic param:number:Number = NUMBER_0 => notify");
    let err = decode(&tokens, &EntityDict::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidNNSyntax);
}

#[test]
fn test_legacy_argmax_decodes_as_sort_index() {
    let tokens = sentence(
        "now => argmax param:file_size of @com.google.drive.list_drive_files => notify",
    );
    let decoded = decode(&tokens, &EntityDict::new()).unwrap();
    let program = decoded.as_program().unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (inner, indices) = table.as_ref().unwrap().kind.as_index().unwrap();
    assert!(inner.kind.is_sort());
    assert_eq!(indices.len(), 1);
}

#[test]
fn test_decode_with_version() {
    let tokens = sentence(
        "now => @com.twitter.post param:status:String = $undefined",
    );
    let decoded = decode_with_version(
        tokens,
        &EntityDict::new(),
        &semver::Version::new(1, 2, 0),
    )
    .unwrap();
    let program = decoded.as_program().unwrap();
    let (_, actions) = program.statements[0].kind.as_command().unwrap();
    match &actions[0] {
        ttc_parser::ast::Action::Invocation(inv) => {
            assert!(inv.in_params[0].value.is_undefined());
        }
        other => panic!("expected an invocation, got {other:?}"),
    }
}
