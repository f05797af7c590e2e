//! End-to-end client benchmarks against an in-process mock server.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lyskom_client::{Client, ConnectionConfig, HandlerTable, Session};
use lyskom_protocol::Request;
use std::sync::Arc;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::runtime::Runtime;

const TIME: &str = "5 30 14 24 11 125 3 357 0";

/// Answers get-time, get-conf-stat, find-next-text-no and accept-async
/// until the client goes away.
async fn serve(stream: DuplexStream) {
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
        return;
    }
    if stream.get_mut().write_all(b"LysKOM\n").await.is_err() {
        return;
    }

    loop {
        line.clear();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let mut fields = line.split_whitespace();
        let (Some(ref_no), Some(call)) = (fields.next(), fields.next()) else {
            continue;
        };
        let reply = match call {
            "35" => format!("={} {}\n", ref_no, TIME),
            "91" => format!(
                "={} 7HNyheter 00001000 {TIME} {TIME} 6 0 6 0 0 0 77 77 12 1 40 0 0 *\n",
                ref_no
            ),
            "60" => {
                let arg: u32 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                format!("={} {}\n", ref_no, arg + 1)
            }
            _ => format!("={}\n", ref_no),
        };
        if stream.get_mut().write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn setup_client(rt: &Runtime) -> Arc<Client> {
    rt.block_on(async {
        let (client_side, server_side) = duplex(1024 * 1024);
        tokio::spawn(serve(server_side));
        let client = Client::new(ConnectionConfig::new("bench:4894"), HandlerTable::new());
        client.connect_with(client_side).await.unwrap();
        Arc::new(client)
    })
}

fn setup_session(rt: &Runtime, caching: bool) -> Session {
    rt.block_on(async {
        let (client_side, server_side) = duplex(1024 * 1024);
        tokio::spawn(serve(server_side));
        let session = Session::new(
            ConnectionConfig::new("bench:4894"),
            HandlerTable::new(),
            caching,
        );
        session.connect_with(client_side).await.unwrap();
        session
    })
}

fn bench_request_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_client(&rt);

    let mut group = c.benchmark_group("e2e_request");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_time", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(client.request(Request::get_time()).await.unwrap()) });
    });

    group.finish();
}

fn bench_concurrent_requests(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = setup_client(&rt);

    let mut group = c.benchmark_group("e2e_concurrent");

    for callers in [10, 50] {
        group.throughput(Throughput::Elements(callers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(callers),
            &callers,
            |b, &callers| {
                b.to_async(&rt).iter(|| {
                    let client = client.clone();
                    async move {
                        let mut tasks = Vec::with_capacity(callers);
                        for n in 0..callers as u32 {
                            let client = client.clone();
                            tasks.push(tokio::spawn(async move {
                                client
                                    .request_as::<u32>(Request::find_next_text_no(n))
                                    .await
                                    .unwrap()
                            }));
                        }
                        for task in tasks {
                            black_box(task.await.unwrap());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_conference_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("e2e_conference");
    group.throughput(Throughput::Elements(1));

    for caching in [false, true] {
        let session = setup_session(&rt, caching);
        let name = if caching { "cached" } else { "uncached" };
        group.bench_function(name, |b| {
            b.to_async(&rt)
                .iter(|| async { black_box(session.conference(42).await.unwrap()) });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_request_latency,
    bench_concurrent_requests,
    bench_conference_lookup,
);
criterion_main!(benches);
