// Enable the optional `bench` feature when running Criterion benches.
use chatdeck::core::config::Config;
use chatdeck::core::context::ChatContext;
use chatdeck::core::router::{Channel, Membership};
use chatdeck::core::rule::{Rule, RuleAction};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Instant;

fn make_config(extra_rules: usize) -> Config {
    let mut rules = vec![
        Rule::new("mute spam", r"spam\.example", RuleAction::Suppress),
        Rule::new(
            "names",
            r"^<(\w+)>",
            RuleAction::Colorize {
                color: "gold".into(),
            },
        ),
        Rule::new(
            "censor",
            r"(?i)\bheck\b",
            RuleAction::Replace {
                template: "****".into(),
                all: true,
            },
        ),
    ];
    for i in 0..extra_rules {
        rules.push(Rule::new(
            format!("keyword {i}"),
            format!(r"\bkeyword{i}\b"),
            RuleAction::Colorize {
                color: "aqua".into(),
            },
        ));
    }
    for (order, rule) in rules.iter_mut().enumerate() {
        rule.order = order as i64;
    }

    Config {
        rules,
        channels: vec![
            Channel::main("Main", "Main"),
            Channel::new(
                "Trade",
                Membership::Pattern {
                    pattern: r"\b(wts|wtb)\b".into(),
                    case_sensitive: false,
                },
            ),
        ],
        ..Config::default()
    }
}

fn make_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| match i % 4 {
            0 => format!("<Player{i}> what the heck is going on at spawn"),
            1 => format!("<Trader{i}> WTS §6diamond§r pickaxe, cheap"),
            2 => "buy gold at spam.example".to_string(),
            _ => format!("§e[Server] restart in {i} minutes"),
        })
        .collect()
}

fn bench_receive(c: &mut Criterion) {
    let lines = make_lines(400);

    for &extra_rules in &[0usize, 50usize] {
        let config = make_config(extra_rules);
        let mut group = c.benchmark_group(format!("receive_rules{}", config.rules.len()));
        group.throughput(Throughput::Elements(lines.len() as u64));

        group.bench_function(BenchmarkId::new("stream", lines.len()), |b| {
            let context = ChatContext::new(&config);
            b.iter(|| {
                for line in &lines {
                    let _ = context.receive(line);
                }
            })
        });

        group.bench_function(BenchmarkId::new("render_main", lines.len()), |b| {
            let context = ChatContext::new(&config);
            for line in &lines {
                let _ = context.receive(line);
            }
            b.iter(|| context.visible_active(Instant::now()))
        });

        group.finish();
    }
}

criterion_group!(benches, bench_receive);
criterion_main!(benches);
