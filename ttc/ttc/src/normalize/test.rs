use ttc_parser::ast::*;

use super::normalize;
use crate::typecheck::test::retriever;
use crate::typecheck::TypecheckOptions;

async fn normalized(source: &str) -> Input {
    let input = ttc_parser::parse_source(source, 0).unwrap();
    let typed = crate::typecheck(input, &retriever(), &TypecheckOptions::default())
        .await
        .unwrap();
    normalize(typed)
}

fn command_table(input: &Input) -> &Table {
    let program = input.as_program().unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    table.as_ref().unwrap()
}

#[tokio::test]
async fn test_identity_on_plain_command() {
    let input = normalized("now => @com.xkcd.get_comic(number=42) => notify;").await;
    let table = command_table(&input);
    assert!(table.kind.is_invocation());
}

#[tokio::test]
async fn test_or_equality_becomes_in_array() {
    let input =
        normalized(r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#)
            .await;
    let (_, filter) = command_table(&input).kind.as_filter().unwrap();

    let atom = filter.as_atom().expect("a single fused atom");
    assert_eq!(atom.name, "labels");
    assert_eq!(atom.operator, FilterOp::InArray);
    let elems = atom.value.kind.as_array().unwrap();
    assert_eq!(elems.len(), 2);
}

#[tokio::test]
async fn test_cnf_with_stable_ordering() {
    let input = normalized(
        r#"now => @com.gmail.inbox(), (subject =~ "b" && is_important == true) || subject =~ "a" => notify;"#,
    )
    .await;
    let (_, filter) = command_table(&input).kind.as_filter().unwrap();

    // And(Or(...), Or(...)) with atoms sorted inside each clause
    let conjuncts = filter.as_and().unwrap();
    assert_eq!(conjuncts.len(), 2);
    for conjunct in conjuncts {
        assert!(conjunct.is_or() || conjunct.is_atom());
    }
}

#[tokio::test]
async fn test_projection_of_projection_merges() {
    let input = normalized(
        "now => [text] of [text, author] of @com.twitter.home_timeline() => notify;",
    )
    .await;
    let (inner, args) = command_table(&input).kind.as_projection().unwrap();
    assert_eq!(args, &vec!["text".to_string()]);
    assert!(inner.kind.is_invocation());
}

#[tokio::test]
async fn test_full_projection_is_dropped() {
    let input = normalized(
        "now => [text, author, hashtags] of @com.twitter.home_timeline() => notify;",
    )
    .await;
    assert!(command_table(&input).kind.is_invocation());
}

#[tokio::test]
async fn test_minimal_projection_widens() {
    let input = normalized("now => [popularity] of @com.spotify.get_song() => notify;").await;
    let (_, args) = command_table(&input).kind.as_projection().unwrap();
    assert!(args.contains(&"popularity".to_string()));
    // the schema's #[minimal_projection=["id"]] is always retained
    assert!(args.contains(&"id".to_string()));
}

#[tokio::test]
async fn test_filter_pushdown_into_join() {
    let input = normalized(
        r#"now => @org.test.a() join @com.gmail.inbox(), subject =~ "urgent" => notify;"#,
    )
    .await;

    // the conjunct touches only the right side, so it moved inside
    let (lhs, rhs, _) = command_table(&input).kind.as_join().unwrap();
    assert!(lhs.kind.is_invocation());
    let (inner, filter) = rhs.kind.as_filter().unwrap();
    assert!(inner.kind.is_invocation());
    assert!(filter.is_atom());
}

#[tokio::test]
async fn test_trivial_compute_is_removed() {
    let input = normalized("now => compute text of @com.twitter.home_timeline() => notify;").await;
    assert!(command_table(&input).kind.is_invocation());
}

#[tokio::test]
async fn test_true_filter_is_dropped() {
    let input = normalized("now => @com.gmail.inbox(), true => notify;").await;
    assert!(command_table(&input).kind.is_invocation());
}

#[tokio::test]
async fn test_sort_slice_shape() {
    let input = normalized(
        "now => sort file_size asc of @com.google.drive.list_drive_files()[1:5] => notify;",
    )
    .await;
    let (inner, _, _) = command_table(&input).kind.as_slice().unwrap();
    assert!(inner.kind.is_sort());
}

#[tokio::test]
async fn test_idempotence() {
    for source in [
        r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#,
        "now => [text] of [text, author] of @com.twitter.home_timeline() => notify;",
        r#"now => @org.test.a() join @com.gmail.inbox(), subject =~ "x" && x == "y" => notify;"#,
        "monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);",
    ] {
        let once = normalized(source).await;
        let twice = normalize(once.clone());
        assert_eq!(once, twice, "normalize is not idempotent on {source}");
    }
}
