use std::net::SocketAddr;
use std::path::PathBuf;

use portico::config::ConfigModel;
use portico::http::request::Method;
use portico::router::{resolve, resolve_under, select_location, select_server, RequestContext};

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

fn two_hosts() -> ConfigModel {
    ConfigModel::from_str(
        "http {
           server { listen 8080; server_name first.example; root /one; }
           server { listen 8080; server_name second.example; root /two; }
           server { listen 9090 127.0.0.1; root /nine; }
         }",
    )
    .unwrap()
}

#[test]
fn test_select_server_by_host_name() {
    let cfg = two_hosts();
    let local = addr("127.0.0.1:8080");

    let server = select_server(&cfg, local, Some("second.example"));
    assert_eq!(server.root, "/two/");
}

#[test]
fn test_select_server_strips_port_from_host() {
    let cfg = two_hosts();
    let local = addr("127.0.0.1:8080");

    let server = select_server(&cfg, local, Some("second.example:8080"));
    assert_eq!(server.root, "/two/");
}

#[test]
fn test_select_server_unknown_host_falls_back_to_first() {
    let cfg = two_hosts();
    let local = addr("127.0.0.1:8080");

    let server = select_server(&cfg, local, Some("nobody.example"));
    assert_eq!(server.root, "/one/");

    let server = select_server(&cfg, local, None);
    assert_eq!(server.root, "/one/");
}

#[test]
fn test_select_server_filters_by_endpoint() {
    let cfg = two_hosts();

    let server = select_server(&cfg, addr("127.0.0.1:9090"), None);
    assert_eq!(server.root, "/nine/");

    // The 9090 server binds 127.0.0.1 specifically; the wildcard servers
    // only claim 8080, so another local address on 9090 has no candidate
    // and the first server is the default.
    let server = select_server(&cfg, addr("10.0.0.1:9090"), None);
    assert_eq!(server.root, "/one/");
}

#[test]
fn test_wildcard_listen_matches_any_local_address() {
    let cfg = two_hosts();

    let server = select_server(&cfg, addr("192.168.1.5:8080"), Some("second.example"));
    assert_eq!(server.root, "/two/");
}

fn located() -> ConfigModel {
    ConfigModel::from_str(
        "http {
           server {
             listen 8080;
             root /srv;
             autoindex on;
             error_page 404 /missing.html;

             location / { }
             location /static { allow_methods GET HEAD; root /files; }
             location /static/img { autoindex off; }
             location /upload { allow_methods POST; upload_dir /incoming; }
             location /cgi { cgi_pass .py /usr/bin/python3; }
           }
         }",
    )
    .unwrap()
}

#[test]
fn test_select_location_longest_prefix_wins() {
    let cfg = located();
    let server = &cfg.servers[0];

    assert_eq!(select_location(server, "/").unwrap().path, "/");
    assert_eq!(
        select_location(server, "/static/site.css").unwrap().path,
        "/static"
    );
    assert_eq!(
        select_location(server, "/static/img/logo.png").unwrap().path,
        "/static/img"
    );
    assert_eq!(select_location(server, "/upload/f.txt").unwrap().path, "/upload");
}

#[test]
fn test_select_location_first_declared_wins_ties() {
    let cfg = ConfigModel::from_str(
        "http { server { listen 8080; root /srv;
           location /a { root /first; }
           location /a { root /second; }
         } }",
    )
    .unwrap();

    let location = select_location(&cfg.servers[0], "/a/x").unwrap();
    assert_eq!(location.root.as_deref(), Some("/first/"));
}

#[test]
fn test_no_location_match_uses_server_directives() {
    let cfg = ConfigModel::from_str(
        "http { server { listen 8080; root /srv;
           location /only { root /other; }
         } }",
    )
    .unwrap();

    let ctx = resolve(&cfg, addr("127.0.0.1:8080"), None, "/elsewhere");
    assert!(ctx.location.is_none());
    assert_eq!(ctx.root(), "/srv/");
}

#[test]
fn test_context_fallback_chain() {
    let cfg = located();
    let local = addr("127.0.0.1:8080");

    let ctx = resolve(&cfg, local, None, "/static/site.css");
    assert_eq!(ctx.root(), "/files/");
    assert!(ctx.autoindex(), "inherits the server autoindex");
    assert_eq!(ctx.allowed_methods(), &[Method::GET, Method::HEAD]);
    assert!(ctx.method_allowed(Method::GET));
    assert!(!ctx.method_allowed(Method::DELETE));
    assert_eq!(ctx.allow_header(), "GET, HEAD");

    let ctx = resolve(&cfg, local, None, "/static/img/logo.png");
    assert!(!ctx.autoindex(), "location override beats the server default");

    let ctx = resolve(&cfg, local, None, "/anything");
    assert_eq!(
        ctx.allowed_methods(),
        &[Method::GET, Method::HEAD, Method::POST, Method::DELETE]
    );
    assert_eq!(ctx.allow_header(), "GET, HEAD, POST, DELETE");
}

#[test]
fn test_context_upload_dir_fallback() {
    let cfg = located();
    let local = addr("127.0.0.1:8080");

    let ctx = resolve(&cfg, local, None, "/upload/file.bin");
    assert_eq!(ctx.upload_dir(), "/incoming/");

    let ctx = resolve(&cfg, local, None, "/static/file.bin");
    assert_eq!(ctx.upload_dir(), "/files/");
}

#[test]
fn test_context_cgi_interpreter_by_extension() {
    let cfg = located();
    let local = addr("127.0.0.1:8080");

    let ctx = resolve(&cfg, local, None, "/cgi/run.py");
    assert_eq!(ctx.cgi_interpreter("/cgi/run.py"), Some("/usr/bin/python3"));
    assert_eq!(ctx.cgi_interpreter("/cgi/readme.txt"), None);
    assert_eq!(ctx.cgi_interpreter("/cgi/noext"), None);

    let ctx = resolve(&cfg, local, None, "/static/run.py");
    assert_eq!(ctx.cgi_interpreter("/static/run.py"), None);
}

#[test]
fn test_context_error_page_lookup() {
    let cfg = located();
    let ctx = resolve(&cfg, addr("127.0.0.1:8080"), None, "/");

    assert_eq!(ctx.error_page(404), Some("/missing.html"));
    assert_eq!(ctx.error_page(500), None);
}

#[test]
fn test_resolve_path_stays_under_root() {
    let cfg = located();
    let ctx: RequestContext = resolve(&cfg, addr("127.0.0.1:8080"), None, "/elsewhere");

    assert_eq!(
        ctx.resolve_path("/a/b.txt").unwrap(),
        PathBuf::from("/srv/a/b.txt")
    );
    assert_eq!(
        ctx.resolve_path("/a/../b.txt").unwrap(),
        PathBuf::from("/srv/b.txt")
    );
    assert_eq!(ctx.resolve_path("/a/./b.txt").unwrap(), PathBuf::from("/srv/a/b.txt"));
    assert!(ctx.resolve_path("/../escape").is_none());
    assert!(ctx.resolve_path("/a/../../escape").is_none());
}

#[test]
fn test_resolve_under_helper() {
    assert_eq!(
        resolve_under("/base/", "x/y").unwrap(),
        PathBuf::from("/base/x/y")
    );
    assert!(resolve_under("/base/", "..").is_none());
    assert_eq!(resolve_under("/base/", "").unwrap(), PathBuf::from("/base/"));
}
