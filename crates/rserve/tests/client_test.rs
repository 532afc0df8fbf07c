//! Client tests against a scripted in-process QAP1 daemon.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gorp_rserve::protocol::{RESP_ERR, RESP_OK};
use gorp_rserve::sexp::encode;
use gorp_rserve::{ClientOptions, Endpoint, Evaluator, RValue, RserveClient, RserveError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

enum Reply {
    Ok(Vec<u8>),
    Err(u8, Option<&'static str>),
    Close,
    Hang,
}

struct FakeDaemon {
    endpoint: Endpoint,
    connections: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

fn greeting(attrs: &[u8]) -> [u8; 32] {
    let mut g = [b'-'; 32];
    g[..12].copy_from_slice(b"Rsrv0103QAP1");
    g[12..12 + attrs.len()].copy_from_slice(attrs);
    g
}

async fn spawn_daemon(greeting: [u8; 32], replies: Vec<Reply>) -> FakeDaemon {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let commands = Arc::new(Mutex::new(Vec::new()));
    let replies = Arc::new(Mutex::new(VecDeque::from(replies)));

    {
        let connections = connections.clone();
        let commands = commands.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, greeting, replies.clone(), commands.clone()));
            }
        });
    }

    FakeDaemon {
        endpoint: Endpoint::parse(&format!("localhost:{port}")).unwrap(),
        connections,
        commands,
    }
}

async fn serve(
    mut stream: TcpStream,
    greeting: [u8; 32],
    replies: Arc<Mutex<VecDeque<Reply>>>,
    commands: Arc<Mutex<Vec<String>>>,
) {
    if stream.write_all(&greeting).await.is_err() {
        return;
    }
    loop {
        let mut header = [0u8; 16];
        if stream.read_exact(&mut header).await.is_err() {
            return;
        }
        let len = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();

        let text = &payload[4..];
        let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
        commands
            .lock()
            .await
            .push(String::from_utf8_lossy(&text[..end]).into_owned());

        let reply = replies.lock().await.pop_front().unwrap_or(Reply::Close);
        let (cmd, body) = match reply {
            Reply::Ok(sexp) => (RESP_OK, encode::dt_sexp(&sexp)),
            Reply::Err(status, msg) => {
                let body = msg
                    .map(|m| {
                        let mut s = m.as_bytes().to_vec();
                        s.push(0);
                        while s.len() % 4 != 0 {
                            s.push(0);
                        }
                        let mut item = vec![4, s.len() as u8, 0, 0];
                        item.extend(s);
                        item
                    })
                    .unwrap_or_default();
                (RESP_ERR | ((status as u32) << 24), body)
            }
            Reply::Close => return,
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return;
            }
        };

        let mut out = Vec::with_capacity(16 + body.len());
        out.extend_from_slice(&cmd.to_le_bytes());
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.extend(body);
        if stream.write_all(&out).await.is_err() {
            return;
        }
    }
}

fn detection_sexp() -> Vec<u8> {
    encode::named_list(&[
        (
            "anoms",
            encode::named_list(&[
                ("index", encode::ints(&[0, 2])),
                ("anoms", encode::doubles(&[6.23, 6.39])),
            ]),
        ),
        ("data", encode::raw(&[0x89, b'P', b'N', b'G'])),
    ])
}

#[tokio::test]
async fn evaluates_and_decodes_named_list() {
    let daemon = spawn_daemon(greeting(b""), vec![Reply::Ok(detection_sexp())]).await;
    let client = RserveClient::connect(&daemon.endpoint, ClientOptions::default())
        .await
        .unwrap();

    let value = client
        .evaluate("processAnomsVec(\"/tmp/gorp-1.csv\")")
        .await
        .unwrap();

    assert_eq!(
        value.get("data"),
        Some(&RValue::Raw(vec![0x89, b'P', b'N', b'G']))
    );
    let anoms = value.get("anoms").unwrap();
    assert_eq!(anoms.get("index"), Some(&RValue::ints([0, 2])));
    assert_eq!(anoms.get("anoms"), Some(&RValue::doubles([6.23, 6.39])));

    assert_eq!(
        daemon.commands.lock().await.as_slice(),
        ["processAnomsVec(\"/tmp/gorp-1.csv\")"]
    );
}

#[tokio::test]
async fn error_response_carries_status_and_keeps_connection() {
    let daemon = spawn_daemon(
        greeting(b""),
        vec![
            Reply::Err(0x7f, None),
            Reply::Err(0x45, Some("object 'x' not found")),
            Reply::Ok(encode::ints(&[1])),
        ],
    )
    .await;
    let client = RserveClient::connect(&daemon.endpoint, ClientOptions::default())
        .await
        .unwrap();

    match client.evaluate("nope()").await {
        Err(RserveError::Command {
            status,
            description,
        }) => {
            assert_eq!(status, 0x7f);
            assert_eq!(description, "unknown variable/method");
        }
        other => panic!("expected command error, got {other:?}"),
    }

    let err = client.evaluate("x").await.unwrap_err();
    assert!(err.to_string().contains("object 'x' not found"), "{err}");

    assert_eq!(client.evaluate("1L").await.unwrap(), RValue::ints([1]));
    assert_eq!(daemon.connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn auth_required_greeting_is_rejected() {
    let daemon = spawn_daemon(greeting(b"ARpt"), vec![]).await;
    let err = RserveClient::connect(&daemon.endpoint, ClientOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RserveError::Handshake(_)), "{err:?}");
}

#[tokio::test]
async fn reconnects_after_connection_drop() {
    let daemon = spawn_daemon(
        greeting(b""),
        vec![Reply::Close, Reply::Ok(encode::doubles(&[2.5]))],
    )
    .await;
    let client = RserveClient::connect(&daemon.endpoint, ClientOptions::default())
        .await
        .unwrap();

    let err = client.evaluate("first").await.unwrap_err();
    assert!(err.breaks_connection(), "{err:?}");

    assert_eq!(
        client.evaluate("second").await.unwrap(),
        RValue::doubles([2.5])
    );
    assert_eq!(daemon.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn eval_timeout_drops_connection() {
    let daemon = spawn_daemon(
        greeting(b""),
        vec![Reply::Hang, Reply::Ok(encode::null())],
    )
    .await;
    let options = ClientOptions {
        eval_timeout: Some(Duration::from_millis(100)),
    };
    let client = RserveClient::connect(&daemon.endpoint, options).await.unwrap();

    let err = client.evaluate("slow()").await.unwrap_err();
    assert!(matches!(err, RserveError::Timeout(_)), "{err:?}");

    assert_eq!(client.evaluate("fast()").await.unwrap(), RValue::Null);
    assert_eq!(daemon.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_callers_are_serialized() {
    let replies = (0..8).map(|i| Reply::Ok(encode::ints(&[i]))).collect();
    let daemon = spawn_daemon(greeting(b""), replies).await;
    let client = Arc::new(
        RserveClient::connect(&daemon.endpoint, ClientOptions::default())
            .await
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.evaluate(&format!("call{i}")).await })
        })
        .collect();
    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }

    assert_eq!(daemon.commands.lock().await.len(), 8);
    assert_eq!(daemon.connections.load(Ordering::SeqCst), 1);
}
