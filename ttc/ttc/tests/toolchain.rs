//! End-to-end scenarios: parse, typecheck against an in-memory catalogue,
//! normalize, prettyprint and round-trip through the NN syntax.

use anyhow::Result;
use ttc::ast::{strip_spans, Input, ValueKind};
use ttc::nn::{self, AllocationMode, EncodeOptions, EntityDict};
use ttc::schema::{CachingSchemaRetriever, MemorySchemaRetriever};
use ttc::{normalize, pretty, typecheck, TypecheckOptions};

const MANIFEST: &str = r#"
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
class @com.weather {
    monitorable query current(in req location : Location, out temperature : Measure(C), out condition : String);
}
class @com.spotify {
    list query get_song(out id : Entity(com.spotify:song), out popularity : Number, out release_date : Date);
    action play_song(in req song : Entity(com.spotify:song));
}
"#;

fn retriever() -> CachingSchemaRetriever<MemorySchemaRetriever> {
    let mut inner = MemorySchemaRetriever::new();
    inner.load_manifest(MANIFEST).unwrap();
    CachingSchemaRetriever::new(inner)
}

async fn pipeline(source: &str) -> Result<Input> {
    let input = ttc::parse_source(source, 0).map_err(|e| anyhow::anyhow!("{e:?}"))?;
    let typed = typecheck(input, &retriever(), &TypecheckOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    Ok(normalize(typed))
}

fn sentence(s: &str) -> Vec<String> {
    s.split_whitespace().map(|t| t.to_string()).collect()
}

/// parse → typecheck → normalize → pretty → parse → typecheck → normalize
/// must be a fixpoint.
async fn assert_pretty_roundtrip(source: &str) -> Result<()> {
    let normalized = pipeline(source).await?;
    let printed = pretty(&normalized);
    let reparsed = pipeline(&printed).await?;
    similar_asserts::assert_eq!(
        strip_spans(normalized),
        strip_spans(reparsed),
        "{printed}"
    );
    Ok(())
}

async fn assert_nn_roundtrip(source: &str, s: &str) -> Result<()> {
    let normalized = pipeline(source).await?;
    let (tokens, entities) = nn::encode(&normalized, &sentence(s), &EncodeOptions::default())?;
    let decoded = nn::decode(&tokens, &entities)?;
    similar_asserts::assert_eq!(
        strip_spans(normalized),
        strip_spans(decoded),
        "{}",
        tokens.join(" ")
    );
    Ok(())
}

#[tokio::test]
async fn scenario_xkcd_comic() -> Result<()> {
    let source = "now => @com.xkcd.get_comic(number=42) => notify;";

    // normalization is the identity here
    let normalized = pipeline(source).await?;
    assert_eq!(pretty(&normalized), source);

    // NN encoding allocates NUMBER_0 for the literal
    let (tokens, entities) =
        nn::encode(&normalized, &sentence("get xkcd comic 42"), &EncodeOptions::default())?;
    assert!(tokens.contains(&"NUMBER_0".to_string()));
    assert_eq!(
        entities.get("NUMBER_0").map(|v| &v.kind),
        Some(&ValueKind::Number(42.0))
    );

    let decoded = nn::decode(&tokens, &entities)?;
    assert_eq!(strip_spans(normalized), strip_spans(decoded));
    Ok(())
}

#[tokio::test]
async fn scenario_monitor_binds_scope() -> Result<()> {
    assert_pretty_roundtrip(
        "monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);",
    )
    .await
}

#[tokio::test]
async fn scenario_or_filter_normalizes_to_in_array() -> Result<()> {
    let normalized = pipeline(
        r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#,
    )
    .await?;

    let printed = pretty(&normalized);
    assert!(printed.contains("in_array"), "{printed}");

    assert_nn_roundtrip(
        r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#,
        "emails labeled a or labeled b",
    )
    .await
}

#[tokio::test]
async fn scenario_sort_slice() -> Result<()> {
    let source =
        "now => sort file_size asc of @com.google.drive.list_drive_files()[1:5] => notify;";
    let normalized = pipeline(source).await?;

    // Slice(Sort(...), 1, 5)
    let program = match &normalized {
        Input::Program(p) => p,
        other => panic!("expected a program, got {other:?}"),
    };
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (inner, _, _) = table.as_ref().unwrap().kind.as_slice().unwrap();
    assert!(inner.kind.is_sort());

    assert_nn_roundtrip(source, "the 5 smallest files in my drive").await
}

#[tokio::test]
async fn scenario_default_temperature() -> Result<()> {
    let normalized = pipeline(
        "monitor @com.weather.current(location=$context.location.home), temperature >= 5defaultTemperature => notify;",
    )
    .await?;
    let printed = pretty(&normalized);
    assert!(printed.contains("5C"), "{printed}");
    Ok(())
}

#[tokio::test]
async fn scenario_policy_roundtrip() -> Result<()> {
    let source = "true : now => @com.twitter.post;";
    let normalized = pipeline(source).await?;

    let rule = match &normalized {
        Input::PermissionRule(rule) => rule,
        other => panic!("expected a permission rule, got {other:?}"),
    };
    assert!(rule.principal.is_true());

    assert_nn_roundtrip(source, "anybody can tweet").await?;
    assert_pretty_roundtrip(source).await
}

#[tokio::test]
async fn pretty_roundtrip_battery() -> Result<()> {
    for source in [
        "now => @com.xkcd.get_comic(number=42) => notify;",
        r#"now => @com.twitter.post(status="hello");"#,
        r#"now => @com.gmail.inbox(), subject =~ "urgent" => notify;"#,
        "now => aggregate avg file_size of @com.google.drive.list_drive_files() => notify;",
        "now => [text, author] of @com.twitter.home_timeline() => notify;",
        "timer(base=new Date(), interval=1h) => notify;",
        r#"edge (monitor @com.weather.current(location=$context.location.home)) on temperature >= 0C => notify;"#,
    ] {
        assert_pretty_roundtrip(source).await?;
    }
    Ok(())
}

#[tokio::test]
async fn normalization_is_idempotent() -> Result<()> {
    for source in [
        r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#,
        "now => [text] of [text, author] of @com.twitter.home_timeline() => notify;",
        "now => sort file_size desc of @com.google.drive.list_drive_files()[1] => notify;",
    ] {
        let once = pipeline(source).await?;
        let twice = normalize(once.clone());
        assert_eq!(once, twice, "{source}");
    }
    Ok(())
}

#[tokio::test]
async fn slot_iteration_covers_every_hole() -> Result<()> {
    let normalized = pipeline(
        r#"now => @com.gmail.inbox(), subject =~ $undefined => @com.twitter.post(status=$undefined);"#,
    )
    .await?;

    let slots: Vec<_> = ttc::ast::iterate_slots(&normalized).collect();
    let empty: Vec<_> = slots
        .iter()
        .filter(|slot| slot.status() == ttc::ast::SlotStatus::Empty)
        .collect();
    assert_eq!(empty.len(), 2);
    Ok(())
}

#[tokio::test]
async fn primitive_iteration_visits_in_order() -> Result<()> {
    let normalized = pipeline(
        "monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);",
    )
    .await?;
    let primitives: Vec<_> = ttc::ast::iterate_primitives(&normalized)
        .map(|(kind, inv)| (kind, inv.channel.clone()))
        .collect();
    assert_eq!(primitives.len(), 2);
    assert_eq!(primitives[0].1, "home_timeline");
    assert_eq!(primitives[1].1, "post");
    Ok(())
}

#[tokio::test]
async fn filters_are_cnf_after_normalization() -> Result<()> {
    let normalized = pipeline(
        r#"now => @com.gmail.inbox(), !(subject =~ "a" && labels == "b") || is_important == true => notify;"#,
    )
    .await?;

    let program = match &normalized {
        Input::Program(p) => p,
        _ => unreachable!(),
    };
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, filter) = table.as_ref().unwrap().kind.as_filter().unwrap();

    // And(Or(literal...)...) with no further nesting
    fn is_literal(f: &ttc::ast::BooleanExpression) -> bool {
        use ttc::ast::BooleanExpression::*;
        matches!(f, Atom(_) | Compute(_) | DontCare { .. } | External(_))
            || matches!(f, Not(inner) if is_literal(inner))
    }
    let clauses: Vec<_> = match filter {
        ttc::ast::BooleanExpression::And(clauses) => clauses.iter().collect(),
        other => vec![other],
    };
    for clause in clauses {
        match clause {
            ttc::ast::BooleanExpression::Or(literals) => {
                assert!(literals.iter().all(is_literal), "{filter:?}")
            }
            other => assert!(is_literal(other), "{filter:?}"),
        }
    }
    Ok(())
}

#[tokio::test]
async fn nn_roundtrip_with_slots_and_dict() -> Result<()> {
    // a dictionary-supplied SLOT resolves to its value
    let tokens = sentence("now => @com.twitter.post param:status:String = SLOT_0");
    let mut entities = EntityDict::new();
    entities.insert("SLOT_0", ttc::ast::Value::string("hello"));
    let decoded = nn::decode(&tokens, &entities)?;
    let program = match decoded {
        Input::Program(p) => p,
        other => panic!("expected a program, got {other:?}"),
    };
    let (_, actions) = program.statements[0].kind.as_command().unwrap();
    match &actions[0] {
        ttc::ast::Action::Invocation(inv) => {
            assert_eq!(inv.in_params[0].value.kind, ValueKind::String("hello".into()));
        }
        other => panic!("expected an invocation, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn non_consecutive_mode_tolerates_gaps() -> Result<()> {
    let input = ttc::parse_source(r#"now => @com.twitter.post(status="good morning");"#, 0)
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;

    // "good" and "morning" are not adjacent in the sentence
    let s = sentence("say good and morning on twitter");
    let strict = nn::encode(&input, &s, &EncodeOptions::default());
    assert!(strict.is_err());

    let tolerant = nn::encode(
        &input,
        &s,
        &EncodeOptions {
            mode: AllocationMode::NonConsecutive,
            ..EncodeOptions::default()
        },
    );
    assert!(tolerant.is_ok());
    Ok(())
}
