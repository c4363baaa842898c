use ttc_parser::ast::strip_spans;

use super::pretty;

/// `parse(pretty(parse(p))) = parse(p)` as AST equality, ignoring source
/// locations.
fn assert_roundtrip(source: &str) {
    let parsed = ttc_parser::parse_source(source, 0).unwrap();
    let printed = pretty(&parsed);
    let reparsed = ttc_parser::parse_source(&printed, 0)
        .unwrap_or_else(|e| panic!("pretty output failed to parse: {printed}\n{e:?}"));
    similar_asserts::assert_eq!(strip_spans(parsed), strip_spans(reparsed), "{printed}");
}

#[test]
fn test_roundtrip_commands() {
    assert_roundtrip("now => @com.xkcd.get_comic(number=42) => notify;");
    assert_roundtrip(r#"now => @com.twitter.post(status="hello world");"#);
    assert_roundtrip("now => @com.twitter.post(status=$undefined);");
}

#[test]
fn test_roundtrip_rules() {
    assert_roundtrip("monitor @com.twitter.home_timeline() => @com.twitter.post(status=text);");
    assert_roundtrip("timer(base=new Date(), interval=1h) => notify;");
    assert_roundtrip("attimer(time=[new Time(8, 30)]) => notify;");
    assert_roundtrip(
        r#"edge (monitor @com.weather.current(location=$context.location.home)) on temperature >= 5C => notify;"#,
    );
}

#[test]
fn test_roundtrip_filters() {
    assert_roundtrip(r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#);
    assert_roundtrip(r#"now => @com.gmail.inbox(), !(subject =~ "spam") => notify;"#);
    assert_roundtrip(r#"now => @com.gmail.inbox(), labels in_array ["a", "b"] => notify;"#);
    assert_roundtrip(r#"now => @com.gmail.inbox(), true(labels) => notify;"#);
    assert_roundtrip(
        r#"now => @com.gmail.inbox(), @com.weather.current(location=$context.location.home) { temperature >= 5C } => notify;"#,
    );
}

#[test]
fn test_roundtrip_table_operators() {
    assert_roundtrip("now => [text, author] of @com.twitter.home_timeline() => notify;");
    assert_roundtrip(
        "now => sort file_size asc of @com.google.drive.list_drive_files()[1:5] => notify;",
    );
    assert_roundtrip("now => aggregate count of @com.gmail.inbox() => notify;");
    assert_roundtrip(
        "now => aggregate avg file_size of @com.google.drive.list_drive_files() => notify;",
    );
    assert_roundtrip("now => @com.twitter.home_timeline()[1] => notify;");
    assert_roundtrip(
        "now => @com.bing.web_search(query=\"cats\") join @com.yandex.translate() on (text=title) => notify;",
    );
    assert_roundtrip("now => result(@com.twitter.home_timeline) => notify;");
    assert_roundtrip("now => compute count(hashtags) as n of @com.twitter.home_timeline() => notify;");
}

#[test]
fn test_roundtrip_values() {
    assert_roundtrip(
        r#"now => @com.example.act(
            a="bob"^^tt:username("Bob Smith"),
            b=new Date(2020, 4, 1),
            c=start_of(week),
            d=new Location(37.442, -122.151, "palo alto"),
            e=enum(on),
            f=[1, 2, 3],
            g=50$usd,
            h=5kWh,
            i=$event,
            j=null^^com.spotify:song("despacito"),
            k=new Date(2020, , ),
            l={ x=1, y="two" }
        );"#,
    );
}

#[test]
fn test_roundtrip_declarations() {
    assert_roundtrip(
        r#"let query q(p : String) := @com.bing.web_search(query=p);
           now => q(p="cats") => notify;"#,
    );
    assert_roundtrip(r#"let cats := @com.thecatapi.get();"#);
}

#[test]
fn test_roundtrip_selector_attributes() {
    assert_roundtrip(r#"now => @com.twitter(id="twitter-foo").post(status="hi");"#);
    assert_roundtrip(r#"now => @com.twitter(all=true).post(status="hi");"#);
}

#[test]
fn test_roundtrip_permission_rules() {
    assert_roundtrip(r#"source == "bob"^^tt:contact : @com.twitter.home_timeline => notify;"#);
    assert_roundtrip("true : * => *;");
    assert_roundtrip(r#"true : now => @com.twitter.post, status =~ "hello";"#);
    assert_roundtrip("true : @com.twitter.* => notify;");
}

#[test]
fn test_roundtrip_bookkeeping_and_control() {
    assert_roundtrip("bookkeeping(special(yes));");
    assert_roundtrip("bookkeeping(choice(2));");
    assert_roundtrip("bookkeeping(answer(42));");
    assert_roundtrip(r#"bookkeeping(commands(category="media"));"#);
    assert_roundtrip("$stop;");
    assert_roundtrip("$nevermind;");
}

#[test]
fn test_roundtrip_class() {
    assert_roundtrip(
        r#"class @com.example extends @org.base {
            import loader from @org.thingpedia.v2();
            monitorable list query things(out id : Entity(com.example:thing), out score : Number)
            #_[canonical="things"]
            #[poll_interval=5min];
            action act(in req message : String #_[prompt="what?"], in opt query : String(tt:search_query), in opt count : Number);
            entity thing #_[description="a thing"];
        }"#,
    );
}

#[test]
fn test_roundtrip_dataset() {
    assert_roundtrip(
        r#"dataset @com.twitter language "en" {
            query := @com.twitter.home_timeline()
            #_[utterances=["my twitter timeline", "tweets i follow"]];
            action (p : String) := @com.twitter.post(status=p)
            #_[utterances=["tweet ${p}"]];
        }"#,
    );
}

#[test]
fn test_roundtrip_dialogue() {
    assert_roundtrip(
        r#"$dialogue @org.thingpedia.dialogue.transaction.sys_recommend_one;
           now => @com.spotify.get_song() => notify
           #[results=[{ id="song1", popularity=42 }]];"#,
    );
}

#[test]
fn test_roundtrip_oninput() {
    assert_roundtrip(
        r#"oninput {
            now => @com.twitter.post(status="yes");
            now => @com.twitter.post(status="no");
        }"#,
    );
}

#[test]
fn test_stable_output() {
    let source = "now => @com.xkcd.get_comic(number=42) => notify;";
    let parsed = ttc_parser::parse_source(source, 0).unwrap();
    insta::assert_snapshot!(
        pretty(&parsed),
        @"now => @com.xkcd.get_comic(number=42) => notify;"
    );

    // printing is deterministic
    assert_eq!(pretty(&parsed), pretty(&parsed));
}

#[test]
fn test_filter_output() {
    let parsed = ttc_parser::parse_source(
        r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#,
        0,
    )
    .unwrap();
    insta::assert_snapshot!(
        pretty(&parsed),
        @r#"now => @com.gmail.inbox(), labels == "a" || labels == "b" => notify;"#
    );
}
