mod support;

use std::{io::Read, time::Duration};

use hyper::Body;
use rquest_engine::{redirect::Policy, Method, StatusCode, StreamHandler, StreamHandlerFactory};
use support::server;

fn hops(path: &str) -> Option<u32> {
    path.strip_prefix("/hop/")?.parse().ok()
}

fn redirect_to(location: String) -> http::Response<Body> {
    http::Response::builder()
        .status(302)
        .header("location", location)
        .body(Body::empty())
        .unwrap()
}

#[test]
fn get_reads_body() {
    let server = server::http(move |req| async move {
        assert_eq!(req.method(), "GET");
        http::Response::builder()
            .header("x-served-by", "support")
            .body(Body::from("Hello"))
            .unwrap()
    });

    let engine = support::engine();
    let mut conn = engine.open_connection(server.url("/text")).unwrap();
    assert_eq!(conn.status(), StatusCode::OK);
    assert_eq!(conn.url().as_str(), server.url("/text"));
    assert_eq!(conn.headers()["x-served-by"], "support");

    let mut body = String::new();
    conn.read_to_string(&mut body).unwrap();
    assert_eq!(body, "Hello");
}

#[test]
fn body_larger_than_one_chunk() {
    let server = server::http(move |_req| async move {
        let (mut tx, body) = Body::channel();
        tokio::spawn(async move {
            for _ in 0..64 {
                tx.send_data(vec![b'a'; 1024].into()).await.unwrap();
            }
        });
        http::Response::new(body)
    });

    let engine = support::engine();
    let text = engine.open_connection(server.url("/big")).unwrap().text().unwrap();
    assert_eq!(text.len(), 64 * 1024);
}

#[test]
fn follows_up_to_ten_redirects() {
    let server = server::http(move |req| async move {
        match hops(req.uri().path()) {
            Some(10) => http::Response::new(Body::from("landed")),
            Some(n) => redirect_to(format!("/hop/{}", n + 1)),
            None => panic!("unexpected path {}", req.uri()),
        }
    });

    let engine = support::engine();
    let conn = engine.open_connection(server.url("/hop/0")).unwrap();
    assert_eq!(conn.url().path(), "/hop/10");
    assert_eq!(conn.text().unwrap(), "landed");
}

#[test]
fn eleventh_redirect_fails() {
    let server = server::http(move |req| async move {
        let n = hops(req.uri().path()).unwrap();
        redirect_to(format!("/hop/{}", n + 1))
    });

    let engine = support::engine();
    let err = engine.open_connection(server.url("/hop/0")).unwrap_err();
    assert!(err.is_redirect(), "{err:?}");
    assert_eq!(err.url().unwrap().path(), "/hop/11");
}

#[test]
fn redirect_loop_fails() {
    let server = server::http(move |req| async move {
        if req.uri() == "/a" {
            redirect_to("/b".to_owned())
        } else {
            redirect_to("/a".to_owned())
        }
    });

    let engine = support::engine();
    let err = engine.open_connection(server.url("/a")).unwrap_err();
    assert!(err.is_redirect(), "{err:?}");
}

#[test]
fn redirects_can_be_disabled() {
    let server = server::http(move |_req| async move { redirect_to("/dst".to_owned()) });

    let engine = support::engine();
    let conn = engine
        .connection(server.url("/src"))
        .follow_redirects(false)
        .open()
        .unwrap();
    assert_eq!(conn.status(), StatusCode::FOUND);
    assert_eq!(conn.headers()["location"], "/dst");

    let conn = engine
        .connection(server.url("/src"))
        .redirect(Policy::none())
        .open()
        .unwrap();
    assert_eq!(conn.url().path(), "/src");
}

#[test]
fn see_other_switches_post_to_get() {
    let server = server::http(move |req| async move {
        if req.uri() == "/form" {
            assert_eq!(req.method(), "POST");
            http::Response::builder()
                .status(303)
                .header("location", "/result")
                .body(Body::empty())
                .unwrap()
        } else {
            assert_eq!(req.method(), "GET");
            assert!(req.headers().get("content-type").is_none());
            let body = hyper::body::to_bytes(req.into_body()).await.unwrap();
            assert!(body.is_empty());
            http::Response::new(Body::from("result"))
        }
    });

    let engine = support::engine();
    let conn = engine
        .connection(server.url("/form"))
        .method(Method::POST)
        .header("content-type", "application/x-www-form-urlencoded")
        .body("a=1")
        .open()
        .unwrap();
    assert_eq!(conn.url().path(), "/result");
    assert_eq!(conn.text().unwrap(), "result");
}

#[test]
fn request_user_agent_overrides_engine() {
    let server = server::http(move |req| async move {
        assert_eq!(req.headers()["user-agent"], "per-request/2");
        http::Response::new(Body::empty())
    });

    let engine = support::engine();
    let conn = engine
        .connection(server.url("/"))
        .header("user-agent", "per-request/2")
        .open()
        .unwrap();
    assert_eq!(conn.status(), StatusCode::OK);
}

#[test]
fn response_timeout() {
    let server = server::http(move |_req| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        http::Response::new(Body::from("late"))
    });

    let engine = support::engine();
    let err = engine
        .connection(server.url("/slow"))
        .timeout(Duration::from_millis(200))
        .open()
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(err.url().map(|u| u.path()), Some("/slow"));
}

#[test]
fn read_timeout() {
    let server = server::http(move |_req| async move {
        let (mut tx, body) = Body::channel();
        tokio::spawn(async move {
            tx.send_data("first".into()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            let _ = tx.send_data("second".into()).await;
        });
        http::Response::new(body)
    });

    let engine = support::engine();
    let mut conn = engine
        .connection(server.url("/stall"))
        .read_timeout(Duration::from_millis(200))
        .open()
        .unwrap();

    let mut buf = [0; 5];
    conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"first");

    let err = conn.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
}

#[test]
fn connection_refused() {
    // reserve a port, then close it
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let engine = support::engine();
    let err = engine
        .open_connection(format!("http://{addr}/"))
        .unwrap_err();
    assert!(err.is_io(), "{err:?}");
    assert!(err.is_connect());
}

#[test]
fn bad_urls_are_rejected_before_sending() {
    let engine = support::engine();
    assert!(engine
        .open_connection("ftp://example.com/")
        .unwrap_err()
        .is_invalid_argument());
    assert!(engine.open_connection("not a url").unwrap_err().is_invalid_argument());
    assert!(engine.open_connection("").unwrap_err().is_missing_argument());
    assert_eq!(engine.active_requests(), 0);
}

#[test]
fn factory_serves_http_schemes() {
    let engine = support::engine();
    let factory = engine.create_connection_factory();

    assert_eq!(factory.handler("http").unwrap().scheme(), "http");
    assert_eq!(
        factory.handler("HTTPS").map(|h| h.scheme().to_owned()),
        cfg!(feature = "default-tls").then(|| "https".to_owned())
    );
    assert!(factory.handler("ftp").is_none());
    assert!(factory.handler("").is_none());

    assert!(factory.create_stream_handler("Http").is_some());
    assert!(factory.create_stream_handler("data").is_none());
}

#[test]
fn handler_opens_connections_for_its_scheme() {
    let server = server::http(move |_req| async move { http::Response::new(Body::from("ok")) });

    let engine = support::engine();
    let factory = engine.create_connection_factory();

    let http = factory.create_stream_handler("http").unwrap();
    let url = rquest_engine::Url::parse(&server.url("/")).unwrap();
    assert_eq!(http.open_connection(&url).unwrap().text().unwrap(), "ok");

    if let Some(https) = factory.handler("https") {
        let err = https.open(server.url("/")).unwrap_err();
        assert!(err.is_invalid_argument(), "{err:?}");
    }
}

#[cfg(not(feature = "default-tls"))]
#[test]
fn https_needs_tls() {
    let engine = support::engine();
    assert!(engine.create_connection_factory().handler("https").is_none());
    assert!(engine
        .open_connection("https://example.com/")
        .unwrap_err()
        .is_invalid_argument());
}

#[test]
fn dropping_a_connection_finishes_the_task() {
    let server = server::http(move |_req| async move {
        let (mut tx, body) = Body::channel();
        tokio::spawn(async move {
            let _ = tx.send_data("partial".into()).await;
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        http::Response::new(body)
    });

    let engine = support::engine();
    let conn = engine.open_connection(server.url("/")).unwrap();
    assert_eq!(engine.active_requests(), 1);
    drop(conn);

    while engine.active_requests() > 0 {
        std::thread::sleep(Duration::from_millis(10));
    }
    engine.shutdown().unwrap();
}

#[test]
fn body_survives_dropping_the_engine() {
    let server = server::http(move |_req| async move {
        let (mut tx, body) = Body::channel();
        tokio::spawn(async move {
            for _ in 0..64 {
                tokio::time::sleep(Duration::from_millis(1)).await;
                tx.send_data(vec![b'z'; 1024].into()).await.unwrap();
            }
        });
        http::Response::builder()
            .header("content-length", 64 * 1024)
            .body(body)
            .unwrap()
    });

    let engine = support::engine();
    let mut conn = engine.open_connection(server.url("/stream")).unwrap();
    drop(engine);

    let mut body = Vec::new();
    conn.read_to_end(&mut body).unwrap();
    assert_eq!(body.len(), 64 * 1024);

    // end of body stays at end
    assert_eq!(conn.read(&mut [0; 8]).unwrap(), 0);
}
