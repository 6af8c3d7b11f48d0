//! Integration tests for URL routing over both transports

mod common;
use common::{http_get, read, Corpus, HOST, TESTHARNESS_JS};
use std::sync::Arc;
use wpt_harness::server::SocketServer;
use wpt_harness::{RouteError, VirtualRequest};

mod virtual_transport {
    use super::*;

    #[tokio::test]
    async fn test_testharness_served_verbatim() {
        let corpus = Corpus::new();
        let router = corpus.router(HOST, "/");
        let body = router
            .resolve(&VirtualRequest::new(format!("{}/resources/testharness.js", HOST)))
            .await
            .unwrap();
        assert_eq!(body, read(&corpus.harness_dir().join("testharness.js")));
    }

    #[tokio::test]
    async fn test_webidl_parser_path() {
        let corpus = Corpus::new();
        let router = corpus.router(HOST, "/");
        let body = router
            .resolve(&VirtualRequest::new(format!("{}/resources/WebIDLParser.js", HOST)))
            .await
            .unwrap();
        assert_eq!(body, b"// webidl2.js\n");
    }

    #[tokio::test]
    async fn test_inline_stubs() {
        let corpus = Corpus::new();
        let router = corpus.router(HOST, "/");
        let cases: &[(&str, &str)] = &[
            (
                "/service-workers/service-worker/resources/test-helpers.sub.js",
                "window.service_worker_test = () => {};",
            ),
            ("/streams/resources/test-initializer.js", "window.worker_test = () => {};"),
            ("/resources/testharness.css", ""),
            ("/resources/testdriver-vendor.js", ""),
        ];
        for (path, expected) in cases {
            let body = router
                .resolve(&VirtualRequest::new(format!("{}{}", HOST, path)))
                .await
                .unwrap();
            assert_eq!(body, expected.as_bytes(), "{}", path);
        }
    }

    #[tokio::test]
    async fn test_missing_corpus_file_is_unexpected_url() {
        let corpus = Corpus::new();
        let router = corpus.router(HOST, "/");
        let url = format!("{}/dom/missing.html", HOST);
        let err = router.resolve(&VirtualRequest::new(url.clone())).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Unexpected URL: {}", url));
    }

    #[tokio::test]
    async fn test_foreign_origin_fails() {
        let corpus = Corpus::new();
        corpus.write("a.html", "<p>a</p>");
        let router = corpus.router(HOST, "/");
        for url in [
            "http://example.com/a.html",
            "http://127.0.0.1:8001/a.html",
            "https://127.0.0.1:8000/a.html",
        ] {
            let err = router.resolve(&VirtualRequest::new(url)).await.unwrap_err();
            assert!(matches!(err, RouteError::OriginMismatch { .. }), "{}", url);
        }
    }

    #[tokio::test]
    async fn test_corpus_mounted_under_root_url() {
        let corpus = Corpus::new();
        corpus.write("dom/a.html", "<p>a</p>");
        let router = corpus.router(HOST, "/wpt/");

        let body = router
            .resolve(&VirtualRequest::new(format!("{}/wpt/dom/a.html", HOST)))
            .await
            .unwrap();
        assert_eq!(body, b"<p>a</p>");

        let err = router
            .resolve(&VirtualRequest::new(format!("{}/dom/a.html", HOST)))
            .await
            .unwrap_err();
        assert!(err.is_unexpected_url());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let corpus = Corpus::new();
        let router = corpus.router(HOST, "/");
        let err = router
            .resolve(&VirtualRequest::new(format!("{}/%2e%2e/harness/gc.js", HOST)))
            .await
            .unwrap_err();
        assert!(err.is_unexpected_url());
    }
}

mod synthesized_documents {
    use super::*;

    #[tokio::test]
    async fn test_any_html_wraps_script() {
        let corpus = Corpus::new();
        corpus.write("dom/foo.any.js", "// META: title=Foo <bar>\n// META: script=helper.js\ntest(() => {});\n");
        let router = corpus.router(HOST, "/");
        let body = router
            .resolve(&VirtualRequest::new(format!("{}/dom/foo.any.html?q=1", HOST)))
            .await
            .unwrap();
        let html = String::from_utf8(body).unwrap();

        assert!(html.contains("<title>Foo &lt;bar&gt;</title>"));
        assert!(html.contains("self.GLOBAL"));
        assert!(html.contains("<script src=\"helper.js\"></script>"));
        assert!(html.contains("<script src=\"/dom/foo.any.js?q=1\"></script>"));

        let harness = html.find("/resources/testharness.js").unwrap();
        let report = html.find("/resources/testharnessreport.js").unwrap();
        let helper = html.find("helper.js").unwrap();
        let test = html.find("/dom/foo.any.js").unwrap();
        assert!(harness < report && report < helper && helper < test);
    }

    #[tokio::test]
    async fn test_window_html_has_no_global_shim() {
        let corpus = Corpus::new();
        corpus.write("bar.window.js", "// META: timeout=long\n");
        let router = corpus.router(HOST, "/");
        let body = router
            .resolve(&VirtualRequest::new(format!("{}/bar.window.html", HOST)))
            .await
            .unwrap();
        let html = String::from_utf8(body).unwrap();
        assert!(!html.contains("self.GLOBAL"));
        assert!(html.contains("<meta name=\"timeout\" content=\"long\">"));
        assert!(html.contains("<script src=\"/bar.window.js\"></script>"));
    }

    #[tokio::test]
    async fn test_any_html_without_script_is_unexpected() {
        let corpus = Corpus::new();
        let router = corpus.router(HOST, "/");
        let err = router
            .resolve(&VirtualRequest::new(format!("{}/ghost.any.html", HOST)))
            .await
            .unwrap_err();
        assert!(err.is_unexpected_url());
    }
}

mod socket_transport {
    use super::*;

    #[tokio::test]
    async fn test_testharness_identical_on_both_transports() {
        let corpus = Corpus::new();
        let server = SocketServer::bind().await.unwrap();
        let origin = server.origin();
        let router = Arc::new(corpus.router(&origin, "/"));
        let _handle = server.serve(Arc::clone(&router));

        let (status, over_socket) = http_get(&origin, "/resources/testharness.js").await;
        let in_process = router
            .resolve(&VirtualRequest::new(format!("{}/resources/testharness.js", origin)))
            .await
            .unwrap();

        assert_eq!(status, 200);
        assert_eq!(over_socket, in_process);
        assert_eq!(over_socket, TESTHARNESS_JS.as_bytes());
    }

    #[tokio::test]
    async fn test_unknown_path_is_500() {
        let corpus = Corpus::new();
        let server = SocketServer::bind().await.unwrap();
        let origin = server.origin();
        let _handle = server.serve(Arc::new(corpus.router(&origin, "/")));

        let (status, body) = http_get(&origin, "/nope.txt").await;
        assert_eq!(status, 500);
        assert!(String::from_utf8_lossy(&body).starts_with("Unexpected URL"));
    }

    #[tokio::test]
    async fn test_gc_helper_not_in_socket_table() {
        let corpus = Corpus::new();
        let server = SocketServer::bind().await.unwrap();
        let origin = server.origin();
        let _handle = server.serve(Arc::new(corpus.router(&origin, "/")));

        let (status, _) = http_get(&origin, "/common/gc.js").await;
        assert_eq!(status, 500);

        corpus.write("common/gc.js", "// corpus copy\n");
        let (status, body) = http_get(&origin, "/common/gc.js").await;
        assert_eq!(status, 200);
        assert_eq!(body, b"// corpus copy\n");
    }
}
