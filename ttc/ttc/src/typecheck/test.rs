use tokio_util::sync::CancellationToken;
use ttc_parser::ast::*;
use ttc_parser::{ErrorKind, TypeErrorKind};

use super::{typecheck, TypecheckOptions};
use crate::schema::MemorySchemaRetriever;

pub(crate) const MANIFEST: &str = r#"
class @com.twitter {
    monitorable list query home_timeline(out text : String, out author : Entity(tt:username), out hashtags : Array(Entity(tt:hashtag)));
    action post(in req status : String);
}
class @com.xkcd {
    monitorable query get_comic(in opt number : Number, out title : String, out picture_url : Entity(tt:picture), out link : Entity(tt:url));
}
class @com.gmail {
    monitorable list query inbox(out subject : String, out labels : String, out is_important : Boolean);
}
class @com.google.drive {
    monitorable list query list_drive_files(out file_id : Entity(com.google.drive:file_id), out file_name : String, out file_size : Measure(byte));
}
class @com.bing {
    monitorable list query web_search(in req query : String(tt:search_query), out title : String, out description : String, out link : Entity(tt:url));
}
class @com.yandex.translate {
    query translate(in req text : String, out translated_text : String);
}
class @com.weather {
    monitorable query current(in req location : Location, out temperature : Measure(C), out condition : String);
}
class @com.spotify {
    list query get_song(out id : Entity(com.spotify:song), out popularity : Number, out release_date : Date)
    #[minimal_projection=["id"]];
    action play_song(in req song : Entity(com.spotify:song));
}
class @org.test {
    query a(out x : String);
    query b(out x : Number);
}
"#;

pub(crate) fn retriever() -> MemorySchemaRetriever {
    let mut retriever = MemorySchemaRetriever::new();
    retriever.load_manifest(MANIFEST).unwrap();
    retriever
}

async fn check(source: &str) -> Result<Input, Vec<ttc_parser::Error>> {
    let input = ttc_parser::parse_source(source, 0)?;
    typecheck(input, &retriever(), &TypecheckOptions::default()).await
}

async fn typecheck_ok(source: &str) -> Input {
    check(source).await.unwrap()
}

async fn first_error_kind(source: &str) -> ErrorKind {
    check(source).await.unwrap_err()[0].kind
}

#[tokio::test]
async fn test_simple_command_typechecks() {
    let input = typecheck_ok("now => @com.xkcd.get_comic(number=42) => notify;").await;
    let program = input.as_program().unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let inv = table.as_ref().unwrap().kind.as_invocation().unwrap();
    let schema = inv.schema.as_ref().expect("schema must be populated");
    assert_eq!(schema.name, "get_comic");
    assert!(schema.is_monitorable);
}

#[tokio::test]
async fn test_monitor_binds_output_scope() {
    // `text` flows from the monitored query into the action
    typecheck_ok("monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);")
        .await;
}

#[tokio::test]
async fn test_unresolved_variable() {
    let kind = first_error_kind(
        "monitor @com.twitter.home_timeline() => @com.twitter.post(status=no_such_param);",
    )
    .await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::UnresolvedVariable));
}

#[tokio::test]
async fn test_unknown_parameter() {
    let kind =
        first_error_kind(r#"now => @com.twitter.post(body="hello");"#).await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::UnknownParameter));
}

#[tokio::test]
async fn test_type_mismatch() {
    let kind = first_error_kind("now => @com.twitter.post(status=42);").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::TypeMismatch));
}

#[tokio::test]
async fn test_missing_required_parameter() {
    let kind = first_error_kind("now => @com.twitter.post();").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::TypeMismatch));

    // a slot-fillable hole satisfies the requirement
    typecheck_ok("now => @com.twitter.post(status=$undefined);").await;
}

#[tokio::test]
async fn test_unresolved_schema() {
    let kind = first_error_kind("now => @com.nonexistent.query() => notify;").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::UnresolvedSchema));
}

#[tokio::test]
async fn test_not_monitorable() {
    let kind = first_error_kind("monitor @com.spotify.get_song() => notify;").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::NotMonitorable));
}

#[tokio::test]
async fn test_not_list() {
    let kind =
        first_error_kind("now => sort title asc of @com.xkcd.get_comic() => notify;").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::NotList));
}

#[tokio::test]
async fn test_sort_slice_typechecks() {
    typecheck_ok(
        "now => sort file_size asc of @com.google.drive.list_drive_files()[1:5] => notify;",
    )
    .await;
}

#[tokio::test]
async fn test_aggregation() {
    typecheck_ok(
        "now => aggregate avg file_size of @com.google.drive.list_drive_files() => notify;",
    )
    .await;
    typecheck_ok("now => aggregate count of @com.gmail.inbox() => notify;").await;

    // averaging a string column is rejected
    let kind = first_error_kind(
        "now => aggregate avg file_name of @com.google.drive.list_drive_files() => notify;",
    )
    .await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::TypeMismatch));
}

#[tokio::test]
async fn test_filter_operators() {
    typecheck_ok(r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#)
        .await;
    typecheck_ok(r#"now => @com.gmail.inbox(), subject =~ "urgent" => notify;"#).await;
    typecheck_ok(
        r#"now => @com.twitter.home_timeline(), contains(hashtags, "rust"^^tt:hashtag) => notify;"#,
    )
    .await;

    let kind = first_error_kind(r#"now => @com.gmail.inbox(), is_important =~ "yes" => notify;"#)
        .await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::InvalidOperator));
}

#[tokio::test]
async fn test_ambiguous_join() {
    let kind =
        first_error_kind("now => @org.test.a() join @org.test.b() => notify;").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::AmbiguousJoin));
}

#[tokio::test]
async fn test_join_with_parameter_passing() {
    typecheck_ok(
        r#"now => @com.bing.web_search(query="cats") join @com.yandex.translate() on (text=title) => notify;"#,
    )
    .await;
}

#[tokio::test]
async fn test_default_temperature_resolution() {
    let input = typecheck_ok(
        "monitor @com.weather.current(location=$context.location.home), temperature >= 5defaultTemperature => notify;",
    )
    .await;

    // the pseudo-unit has been replaced by the preferred unit
    let pretty = crate::codegen::pretty(&input);
    assert!(pretty.contains("5C"), "{pretty}");
}

#[tokio::test]
async fn test_projection_unknown_parameter() {
    let kind =
        first_error_kind("now => [no_such] of @com.twitter.home_timeline() => notify;").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::UnknownParameter));
}

#[tokio::test]
async fn test_declaration_and_invocation() {
    typecheck_ok(
        r#"let query q(p : String) := @com.bing.web_search(query=p);
           now => q(p="cats") => notify;"#,
    )
    .await;

    let kind = first_error_kind("now => q() => notify;").await;
    assert_eq!(kind, ErrorKind::Type(TypeErrorKind::UnresolvedVariable));
}

#[tokio::test]
async fn test_permission_rule() {
    typecheck_ok(r#"source == "bob"^^tt:contact : @com.twitter.home_timeline => notify;"#).await;
    typecheck_ok(r#"true : now => @com.twitter.post, status =~ "hello";"#).await;
}

#[tokio::test]
async fn test_errors_accumulate_across_statements() {
    let errors = check(
        r#"now => @com.twitter.post(status=42);
           now => @com.twitter.post(body="x");"#,
    )
    .await
    .unwrap_err();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn test_cancellation() {
    let retriever = retriever();
    let input = ttc_parser::parse_source("now => @com.xkcd.get_comic() => notify;", 0).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let options = TypecheckOptions {
        token,
        ..TypecheckOptions::default()
    };
    let errors = super::typecheck(input, &retriever, &options).await.unwrap_err();
    assert_eq!(errors[0].kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_determinism() {
    let retriever = retriever();
    let input = ttc_parser::parse_source(
        r#"now => @com.gmail.inbox(), labels == "a" => notify;"#,
        0,
    )
    .unwrap();

    let options = TypecheckOptions::default();
    let a = typecheck(input.clone(), &retriever, &options).await.unwrap();
    let b = typecheck(input, &retriever, &options).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_undefined_rejected_in_dialogue_results() {
    let errors = check(
        r#"$dialogue @org.thingpedia.dialogue.transaction.sys_recommend_one;
           now => @com.spotify.get_song() => notify
           #[results=[{ id=$undefined }]];"#,
    )
    .await
    .unwrap_err();
    assert_eq!(
        errors[0].kind,
        ErrorKind::Type(TypeErrorKind::TypeMismatch)
    );
}
