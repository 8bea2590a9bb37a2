#![forbid(unsafe_code)]

use chatline_domain::{ChannelName, ChannelRef};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::HelixClient;
use super::helix::validate_user_token_at;
use crate::assets::CatalogProvider;
use crate::assets::helix::{HelixBadges, HelixEmotes};
use crate::{Credential, SharedCredential};

/// Serve exactly one HTTP response and hand back the request head.
async fn serve_once(status: &'static str, body: serde_json::Value) -> (String, JoinHandle<String>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
	let base = format!("http://{}", listener.local_addr().expect("local addr"));

	let handle = tokio::spawn(async move {
		let (mut stream, _) = listener.accept().await.expect("accept");
		let mut buf = Vec::new();
		let mut chunk = [0u8; 1024];
		loop {
			let n = stream.read(&mut chunk).await.expect("read");
			if n == 0 {
				break;
			}
			buf.extend_from_slice(&chunk[..n]);
			if buf.windows(4).any(|w| w == b"\r\n\r\n") {
				break;
			}
		}

		let body = body.to_string();
		let resp = format!(
			"HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
			body.len()
		);
		stream.write_all(resp.as_bytes()).await.expect("write");
		let _ = stream.shutdown().await;
		String::from_utf8_lossy(&buf).to_lowercase()
	});

	(base, handle)
}

fn credential() -> SharedCredential {
	SharedCredential::new(Some(Credential::new("cid", "oauth:tok")))
}

#[tokio::test]
async fn resolves_channel_through_users_endpoint() {
	let (base, server) = serve_once(
		"200 OK",
		json!({ "data": [{ "id": "141981764", "login": "twitchdev", "display_name": "TwitchDev" }] }),
	)
	.await;

	let client = HelixClient::new(&base, credential()).expect("client");
	let channel = client.resolve_channel(&ChannelName::new("#TwitchDev")).await.expect("resolve");
	assert_eq!(channel, ChannelRef::new("141981764", "twitchdev").expect("ref"));

	let head = server.await.expect("server");
	assert!(head.starts_with("get /helix/users?login=twitchdev "), "{head}");
	assert!(head.contains("client-id: cid"), "{head}");
	assert!(head.contains("authorization: bearer tok"), "{head}");
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
	let (base, server) = serve_once("200 OK", json!({ "data": [{ "id": "1", "login": "foo" }] })).await;

	let client = HelixClient::new(&format!("{base}/mock/"), credential()).expect("client");
	client.resolve_channel(&ChannelName::new("foo")).await.expect("resolve");

	let head = server.await.expect("server");
	assert!(head.starts_with("get /mock/helix/users?login=foo "), "{head}");
}

#[tokio::test]
async fn unknown_channel_is_an_error() {
	let (base, server) = serve_once("200 OK", json!({ "data": [] })).await;

	let client = HelixClient::new(&base, credential()).expect("client");
	let err = client
		.resolve_channel(&ChannelName::new("nobody"))
		.await
		.expect_err("empty data");
	assert!(err.to_string().contains("unknown twitch channel nobody"));
	server.await.expect("server");
}

#[tokio::test]
async fn request_without_credential_fails_before_sending() {
	let client = HelixClient::new("http://127.0.0.1:9", SharedCredential::default()).expect("client");
	let err = client.get_user_by_login("x").await.expect_err("no credential");
	assert!(err.to_string().contains("without a credential"));
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
	let (base, server) = serve_once("404 Not Found", json!({ "message": "nope" })).await;

	let client = HelixClient::new(&base, credential()).expect("client");
	let err = client.get_user_by_login("x").await.expect_err("404");
	assert!(format!("{err:#}").contains("status=404"));
	server.await.expect("server");
}

#[tokio::test]
async fn helix_emotes_provider_maps_response() {
	let (base, server) = serve_once(
		"200 OK",
		json!({
			"data": [
				{ "id": "25", "name": "Kappa", "format": ["static"], "scale": ["1.0", "3.0"], "theme_mode": ["dark"] },
				{ "id": "88", "name": "PogChamp", "format": ["static"], "scale": ["1.0"], "theme_mode": ["dark"] }
			],
			"template": "https://static-cdn.jtvnw.net/emoticons/v2/{{id}}/{{format}}/{{theme_mode}}/{{scale}}"
		}),
	)
	.await;

	let client = HelixClient::new(&base, credential()).expect("client");
	let provider = HelixEmotes::new(client);
	let channel = ChannelRef::new("141981764", "twitchdev").expect("ref");
	let emotes = provider.fetch_channel(&channel).await.expect("fetch");

	assert_eq!(emotes.len(), 2);
	assert_eq!(emotes[0].url, "https://static-cdn.jtvnw.net/emoticons/v2/25/static/dark/3.0");
	assert_eq!(emotes[1].url, "");

	let head = server.await.expect("server");
	assert!(head.starts_with("get /helix/chat/emotes?broadcaster_id=141981764 "), "{head}");
}

#[tokio::test]
async fn helix_badges_provider_flattens_sets() {
	let (base, server) = serve_once(
		"200 OK",
		json!({
			"data": [
				{ "set_id": "subscriber", "versions": [
					{ "id": "0", "title": "Subscriber", "image_url_1x": "a1", "image_url_2x": "a2", "image_url_4x": "a4" },
					{ "id": "3", "title": "3-Month Subscriber", "image_url_1x": "b1", "image_url_2x": "b2", "image_url_4x": "b4" }
				]},
				{ "set_id": "moderator", "versions": [
					{ "id": "1", "title": "Moderator", "image_url_1x": "m1", "image_url_2x": "m2", "image_url_4x": "m4" }
				]}
			]
		}),
	)
	.await;

	let client = HelixClient::new(&base, credential()).expect("client");
	let badges = HelixBadges::new(client).fetch_global().await.expect("fetch");
	let ids: Vec<&str> = badges.iter().map(|b| b.id.as_str()).collect();
	assert_eq!(ids, vec!["subscriber/0", "subscriber/3", "moderator/1"]);
	assert_eq!(badges[2].url, "m4");

	let head = server.await.expect("server");
	assert!(head.starts_with("get /helix/chat/badges/global "), "{head}");
}

#[tokio::test]
async fn token_validation_uses_oauth_header() {
	let (base, server) = serve_once(
		"200 OK",
		json!({ "client_id": "cid", "login": "someone", "user_id": "1", "expires_in": 3600, "scopes": ["chat:read"] }),
	)
	.await;

	let v = validate_user_token_at(&format!("{base}/oauth2/validate"), "tok").await.expect("valid");
	assert_eq!(v.login, "someone");
	assert_eq!(v.scopes, vec!["chat:read".to_string()]);

	let head = server.await.expect("server");
	assert!(head.contains("authorization: oauth tok"), "{head}");
}

#[tokio::test]
async fn rejected_token_is_invalid() {
	let (base, server) = serve_once("401 Unauthorized", json!({ "status": 401, "message": "invalid access token" })).await;

	let err = validate_user_token_at(&format!("{base}/oauth2/validate"), "bad")
		.await
		.expect_err("401");
	assert!(err.to_string().contains("status=401"));
	server.await.expect("server");
}
