use crate::ast::*;
use crate::{parse_permission_rule, parse_program, parse_source};

fn parse(source: &str) -> Input {
    parse_source(source, 0).unwrap()
}

#[test]
fn test_simple_command() {
    let program = parse_program("now => @com.xkcd.get_comic(number=42) => notify;", 0).unwrap();
    assert_eq!(program.statements.len(), 1);

    let (table, actions) = program.statements[0].kind.as_command().unwrap();
    let table = table.as_ref().unwrap();
    let inv = table.kind.as_invocation().unwrap();
    assert_eq!(inv.selector.kind, "com.xkcd");
    assert_eq!(inv.channel, "get_comic");
    assert_eq!(inv.in_params.len(), 1);
    assert_eq!(inv.in_params[0].name, "number");
    assert_eq!(inv.in_params[0].value.kind, ValueKind::Number(42.0));
    assert_eq!(actions, &vec![Action::Notify(NotifyKind::Notify)]);
}

#[test]
fn test_action_only_command() {
    let program = parse_program(r#"now => @com.twitter.post(status="hello");"#, 0).unwrap();
    let (table, actions) = program.statements[0].kind.as_command().unwrap();
    assert!(table.is_none());
    assert!(matches!(&actions[0], Action::Invocation(inv) if inv.channel == "post"));
}

#[test]
fn test_monitor_rule() {
    let program = parse_program(
        "monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);",
        0,
    )
    .unwrap();
    let (stream, actions) = program.statements[0].kind.as_rule().unwrap();
    let (table, args) = stream.kind.as_monitor().unwrap();
    assert!(args.is_none());
    assert!(table.kind.is_invocation());
    let inv = match &actions[0] {
        Action::Invocation(inv) => inv,
        other => panic!("expected invocation, got {other:?}"),
    };
    assert_eq!(inv.in_params[0].value.kind, ValueKind::VarRef("text".to_string()));
}

#[test]
fn test_or_filter() {
    let program = parse_program(
        r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#,
        0,
    )
    .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, filter) = table.as_ref().unwrap().kind.as_filter().unwrap();
    let disjuncts = filter.as_or().unwrap();
    assert_eq!(disjuncts.len(), 2);
    for d in disjuncts {
        let atom = d.as_atom().unwrap();
        assert_eq!(atom.name, "labels");
        assert_eq!(atom.operator, FilterOp::Eq);
    }
}

#[test]
fn test_slice_binds_outside_sort() {
    let program = parse_program(
        "now => sort file_size asc of @com.google.drive.list_drive_files()[1:5] => notify;",
        0,
    )
    .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (inner, base, limit) = table.as_ref().unwrap().kind.as_slice().unwrap();
    assert_eq!(base.kind, ValueKind::Number(1.0));
    assert_eq!(limit.kind, ValueKind::Number(5.0));
    let (sorted, field, direction) = inner.kind.as_sort().unwrap();
    assert_eq!(field, "file_size");
    assert_eq!(*direction, SortDirection::Asc);
    assert!(sorted.kind.is_invocation());
}

#[test]
fn test_aggregation() {
    let program = parse_program(
        "now => aggregate avg file_size of @com.google.drive.list_drive_files() => notify;",
        0,
    )
    .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, op, field, _) = table.as_ref().unwrap().kind.as_aggregation().unwrap();
    assert_eq!(*op, AggregationOp::Avg);
    assert_eq!(field.as_deref(), Some("file_size"));

    let program =
        parse_program("now => aggregate count of @com.twitter.home_timeline() => notify;", 0)
            .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, op, field, _) = table.as_ref().unwrap().kind.as_aggregation().unwrap();
    assert_eq!(*op, AggregationOp::Count);
    assert!(field.is_none());
}

#[test]
fn test_timer() {
    let program = parse_program(
        "timer(base=new Date(), interval=1h) => notify;",
        0,
    )
    .unwrap();
    let (stream, _) = program.statements[0].kind.as_rule().unwrap();
    let (base, interval, frequency) = stream.kind.as_timer().unwrap();
    assert_eq!(base.kind, ValueKind::Date(DateValue::Now));
    assert_eq!(
        interval.kind,
        ValueKind::Measure {
            value: 1.0,
            unit: "h".to_string()
        }
    );
    assert!(frequency.is_none());
}

#[test]
fn test_values() {
    let program = parse_program(
        r#"now => @com.example.act(
            a="bob"^^tt:username,
            b=new Date(2020, 4, 1),
            c=start_of(day),
            d=new Time(8, 30),
            e=enum(on),
            f=$undefined,
            g=[1, 2, 3],
            h=$context.location.home,
            i=-5,
            j=new Location(37.442, -122.151, "palo alto")
        );"#,
        0,
    )
    .unwrap();
    let (_, actions) = program.statements[0].kind.as_command().unwrap();
    let inv = match &actions[0] {
        Action::Invocation(inv) => inv,
        other => panic!("expected invocation, got {other:?}"),
    };
    let get = |name: &str| {
        &inv.in_params
            .iter()
            .find(|p| p.name == name)
            .unwrap()
            .value
            .kind
    };

    assert_eq!(
        get("a"),
        &ValueKind::Entity {
            value: Some("bob".to_string()),
            kind: "tt:username".to_string(),
            display: None
        }
    );
    assert_eq!(
        get("b"),
        &ValueKind::Date(DateValue::Absolute(DateTimeValue {
            year: 2020,
            month: 4,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0
        }))
    );
    assert_eq!(
        get("c"),
        &ValueKind::Date(DateValue::Edge {
            edge: DateEdge::StartOf,
            unit: "day".to_string()
        })
    );
    assert_eq!(
        get("d"),
        &ValueKind::Time(TimeValue {
            hour: 8,
            minute: 30,
            second: 0
        })
    );
    assert_eq!(get("e"), &ValueKind::Enum("on".to_string()));
    assert_eq!(
        get("f"),
        &ValueKind::Undefined {
            slot_fillable: true
        }
    );
    assert!(matches!(get("g"), ValueKind::Array(elems) if elems.len() == 3));
    assert_eq!(
        get("h"),
        &ValueKind::Location(LocationValue::Relative("home".to_string()))
    );
    assert_eq!(get("i"), &ValueKind::Number(-5.0));
    assert!(matches!(
        get("j"),
        ValueKind::Location(LocationValue::Absolute { display: Some(d), .. }) if d == "palo alto"
    ));
}

#[test]
fn test_partial_date() {
    let program = parse_program("now => @com.example.act(a=new Date(2020, , ));", 0).unwrap();
    let (_, actions) = program.statements[0].kind.as_command().unwrap();
    let inv = match &actions[0] {
        Action::Invocation(inv) => inv,
        _ => unreachable!(),
    };
    assert_eq!(
        inv.in_params[0].value.kind,
        ValueKind::Date(DateValue::Piece {
            year: Some(2020),
            month: None,
            day: None,
            time: None
        })
    );
}

#[test]
fn test_join_with_params() {
    let program = parse_program(
        "now => @com.bing.web_search() join @com.yandex.translate() on (text=title) => notify;",
        0,
    )
    .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (lhs, rhs, in_params) = table.as_ref().unwrap().kind.as_join().unwrap();
    assert!(lhs.kind.is_invocation());
    assert!(rhs.kind.is_invocation());
    assert_eq!(in_params.len(), 1);
    assert_eq!(in_params[0].name, "text");
}

#[test]
fn test_selector_attributes() {
    let program = parse_program(
        r#"now => @com.twitter(id="twitter-foo", all=true).post(status="hi");"#,
        0,
    )
    .unwrap();
    let (_, actions) = program.statements[0].kind.as_command().unwrap();
    let inv = match &actions[0] {
        Action::Invocation(inv) => inv,
        _ => unreachable!(),
    };
    assert_eq!(inv.selector.kind, "com.twitter");
    assert_eq!(inv.selector.id.as_deref(), Some("twitter-foo"));
    assert!(inv.selector.all);
    assert_eq!(inv.channel, "post");
}

#[test]
fn test_declaration_and_varref() {
    let program = parse_program(
        r#"let query q(p : String) := @com.bing.web_search(query=p);
           now => q(p="cats") => notify;"#,
        0,
    )
    .unwrap();
    assert_eq!(program.statements.len(), 2);
    let decl = program.statements[0].kind.as_declaration().unwrap();
    assert_eq!(decl.name, "q");
    assert!(decl.args.contains_key("p"));
    assert!(decl.value.is_table());

    let (table, _) = program.statements[1].kind.as_command().unwrap();
    let (name, in_params) = table.as_ref().unwrap().kind.as_var_ref().unwrap();
    assert_eq!(name, "q");
    assert_eq!(in_params.len(), 1);
}

#[test]
fn test_permission_rule() {
    let rule = parse_permission_rule(
        r#"source == "bob"^^tt:contact : @com.twitter.home_timeline => notify;"#,
        0,
    )
    .unwrap();
    assert!(rule.principal.is_atom());
    assert!(matches!(
        &rule.query,
        PermissionFunction::Specified { kind, channel, .. }
            if kind == "com.twitter" && channel == "home_timeline"
    ));
    assert_eq!(rule.action, PermissionFunction::Builtin);
}

#[test]
fn test_permission_rule_wildcards() {
    let rule = parse_permission_rule("true : now => @com.twitter.post => *;", 0).unwrap();
    assert!(rule.principal.is_true());
    assert_eq!(rule.query, PermissionFunction::Builtin);
    assert!(matches!(
        &rule.action,
        PermissionFunction::Specified { channel, .. } if channel == "post"
    ));

    let rule = parse_permission_rule("true : * => @com.twitter.*;", 0).unwrap();
    assert_eq!(rule.query, PermissionFunction::Star);
    assert_eq!(
        rule.action,
        PermissionFunction::ClassStar("com.twitter".to_string())
    );
}

#[test]
fn test_class_def() {
    let input = parse(
        r#"class @com.example extends @org.base {
            import loader from @org.thingpedia.v2();
            monitorable list query things(out id : Entity(com.example:thing), out score : Number)
            #_[canonical="things"]
            #[poll_interval=5min];
            action act(in req message : String #_[prompt="what?"], in opt count : Number);
            entity thing #_[description="a thing"];
        }"#,
    );
    let library = input.as_library().unwrap();
    assert_eq!(library.classes.len(), 1);
    let class = &library.classes[0];
    assert_eq!(class.kind, "com.example");
    assert_eq!(class.extends, vec!["org.base".to_string()]);
    assert_eq!(class.imports.len(), 1);

    let query = class.queries.get("things").unwrap();
    assert!(query.is_monitorable);
    assert!(query.is_list);
    assert_eq!(query.kind, "com.example");
    assert_eq!(query.args.len(), 2);
    assert!(query.annotations.contains_key("poll_interval"));

    let action = class.actions.get("act").unwrap();
    assert!(action.arg("message").unwrap().is_required());
    assert!(!action.arg("count").unwrap().is_required());
    assert_eq!(class.entities.len(), 1);
}

#[test]
fn test_string_hint_type() {
    let input = parse(
        r#"class @com.bing {
            list query web_search(in req query : String(tt:search_query), out title : String);
        }"#,
    );
    let library = input.as_library().unwrap();
    let query = library.classes[0].queries.get("web_search").unwrap();
    assert_eq!(
        query.arg("query").unwrap().ty,
        crate::ty::Type::HintedString("tt:search_query".to_string())
    );
    assert_eq!(query.arg("title").unwrap().ty, crate::ty::Type::String);
}

#[test]
fn test_dataset() {
    let input = parse(
        r#"dataset @com.twitter language "en" {
            query := @com.twitter.home_timeline()
            #_[utterances=["my twitter timeline", "tweets i follow"]];
        }"#,
    );
    let library = input.as_library().unwrap();
    assert_eq!(library.datasets.len(), 1);
    let dataset = &library.datasets[0];
    assert_eq!(dataset.name, "com.twitter");
    assert_eq!(dataset.language, "en");
    assert_eq!(dataset.examples.len(), 1);
    assert_eq!(dataset.examples[0].utterances.len(), 2);
    assert!(dataset.examples[0].value.is_query());
}

#[test]
fn test_bookkeeping() {
    let input = parse("bookkeeping(special(yes));");
    let bookkeeping = input.as_bookkeeping().unwrap();
    assert_eq!(
        bookkeeping.intent,
        BookkeepingIntent::Special("yes".to_string())
    );

    let input = parse("bookkeeping(choice(2));");
    assert_eq!(
        input.as_bookkeeping().unwrap().intent,
        BookkeepingIntent::Choice(2)
    );

    let input = parse("bookkeeping(answer(42));");
    assert!(matches!(
        &input.as_bookkeeping().unwrap().intent,
        BookkeepingIntent::Answer(v) if v.kind == ValueKind::Number(42.0)
    ));
}

#[test]
fn test_control_command() {
    let input = parse("$stop;");
    assert_eq!(input.as_control_command().unwrap().intent, ControlIntent::Stop);
}

#[test]
fn test_dialogue_state() {
    let input = parse(
        r#"$dialogue @org.thingpedia.dialogue.transaction.sys_recommend_one;
           now => @com.spotify.get_song() => notify
           #[results=[{ id="song1", popularity=42 }]]
           #[count=1];"#,
    );
    let state = input.as_dialogue_state().unwrap();
    assert_eq!(state.policy, "org.thingpedia.dialogue.transaction");
    assert_eq!(state.dialogue_act, "sys_recommend_one");
    assert_eq!(state.history.len(), 1);

    let item = &state.history[0];
    assert_eq!(item.confirm, ConfirmationState::ConfirmedAndExecuted);
    let results = item.results.as_ref().unwrap();
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.count.kind, ValueKind::Number(1.0));
    assert!(!results.more);
}

#[test]
fn test_oninput() {
    let program = parse_program(
        r#"oninput {
            now => @com.twitter.post(status="yes") #_[utterances=["post yes"]];
            now => @com.twitter.post(status="no");
        }"#,
        0,
    )
    .unwrap();
    assert_eq!(program.statements.len(), 2);
    for stmt in &program.statements {
        assert!(stmt.kind.is_on_input_choice());
    }
}

#[test]
fn test_compute_filter() {
    let program = parse_program(
        "now => @com.gmail.inbox(), count(labels) >= 2 => notify;",
        0,
    )
    .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, filter) = table.as_ref().unwrap().kind.as_filter().unwrap();
    let compute = filter.as_compute().unwrap();
    assert_eq!(compute.operator, FilterOp::Ge);
    assert!(matches!(
        &compute.lhs.kind,
        ValueKind::Computation { op: ScalarOp::Count, operands } if operands.len() == 1
    ));
}

#[test]
fn test_dont_care() {
    let program = parse_program("now => @com.gmail.inbox(), true(labels) => notify;", 0).unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, filter) = table.as_ref().unwrap().kind.as_filter().unwrap();
    assert!(matches!(filter, BooleanExpression::DontCare { name } if name == "labels"));
}

#[test]
fn test_external_filter() {
    let program = parse_program(
        "now => @com.gmail.inbox(), @com.weather.current(location=$context.location.home) { temperature >= 5C } => notify;",
        0,
    )
    .unwrap();
    let (table, _) = program.statements[0].kind.as_command().unwrap();
    let (_, filter) = table.as_ref().unwrap().kind.as_filter().unwrap();
    let external = filter.as_external().unwrap();
    assert_eq!(external.invocation.channel, "current");
    assert!(external.filter.is_atom());
}

#[test]
fn test_parse_error_is_fatal() {
    let result = parse_program("now => => notify;", 0);
    let errors = result.unwrap_err();
    assert!(!errors.is_empty());
    assert_eq!(errors[0].kind, crate::error::ErrorKind::Parse);
}

#[test]
fn test_strip_spans() {
    let a = parse("now => @com.xkcd.get_comic(number=42) => notify;");
    let b = parse("now  =>  @com.xkcd.get_comic( number = 42 )  =>  notify ;");
    assert_ne!(a, b);
    assert_eq!(strip_spans(a), strip_spans(b));
}
