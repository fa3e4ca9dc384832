//! Run with: cargo run --bin caption_chat
//!
//! Terminal front-end for the relay. Expects the server from `cargo run` to be
//! reachable at RELAY_URL (default http://localhost:3000).

use std::path::PathBuf;

use anyhow::Result;
use caption_relay::client::api::RelayClient;
use caption_relay::client::render;
use caption_relay::client::session::{FormInputs, ReplyOutcome, Session};
use caption_relay::config;
use caption_relay::modules::chat::schema::{ChatRequest, Medium};
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};

const CLIENT_OPTIONS: [&str; 9] = [
    "ロート製薬",
    "トランシーノ",
    "matsukiyo",
    "ケープ",
    "ウエルシア",
    "ファンケル",
    "ロクシタン",
    "トワニー",
    "ミノン",
];

struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Self {
            lines: BufReader::new(stdin()).lines(),
        }
    }

    /// `None` on end of input.
    async fn ask(&mut self, label: &str) -> Result<Option<String>> {
        println!("{}", label);
        Ok(self.lines.next_line().await?.map(|l| l.trim().to_string()))
    }
}

async fn read_form(prompt: &mut Prompt) -> Result<Option<FormInputs>> {
    let mut form = FormInputs::default();

    loop {
        let Some(client) = prompt
            .ask(&format!("クライアント名 ({}):", CLIENT_OPTIONS.join(" / ")))
            .await?
        else {
            return Ok(None);
        };
        form.client = client;

        let media: Vec<&str> = Medium::all().iter().map(|m| m.as_str()).collect();
        let Some(medium) = prompt.ask(&format!("媒体 ({}):", media.join(" / "))).await? else {
            return Ok(None);
        };
        form.medium = Medium::parse(&medium);

        let Some(product) = prompt.ask("商品名・サービス名:").await? else {
            return Ok(None);
        };
        form.product = product;

        let Some(theme) = prompt.ask("投稿テーマ:").await? else {
            return Ok(None);
        };
        form.theme = theme;

        let Some(tone) = prompt.ask("トーン (任意):").await? else {
            return Ok(None);
        };
        form.tone = Some(tone).filter(|t| !t.is_empty());

        let Some(files) = prompt.ask("添付ファイル (任意, 空白区切り):").await? else {
            return Ok(None);
        };
        form.files = files.split_whitespace().map(PathBuf::from).collect();

        if form.is_complete() {
            return Ok(Some(form));
        }
        println!("入力が不足しています。もう一度入力してください。");
    }
}

async fn submit(relay: &RelayClient, session: &mut Session, request: Result<ChatRequest>) {
    let reply = match session.begin_request() {
        Ok(reply) => reply,
        Err(e) => {
            println!("! {}", e);
            return;
        }
    };

    let outcome = match request {
        Ok(request) => match relay.chat(&request).await {
            Ok(response) => ReplyOutcome::Result {
                data: response.data,
                conversation_id: response.conversation_id,
            },
            Err(e) => ReplyOutcome::Error(e.to_string()),
        },
        Err(e) => ReplyOutcome::Error(e.to_string()),
    };

    if session.resolve(reply, outcome) {
        if let Some(last) = session.messages().last() {
            println!("{}", render::message(last));
        }
    }
}

async fn generate(relay: &RelayClient, session: &mut Session, form: &FormInputs) {
    let message = form.summary();
    session.push_user(message.clone());
    println!("> {}", message);
    println!("生成中...");

    let request = match relay.upload_all(&form.files).await {
        Ok(files) => session.generation_request(form, files).map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };

    submit(relay, session, request).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let relay = RelayClient::new(config::server::relay_url());
    match relay.health().await {
        Ok(health) if !health.configured => {
            println!("⚠️  Relay is up but the workflow API is not configured.")
        }
        Ok(_) => {}
        Err(e) => println!("⚠️  Relay health check failed: {}", e),
    }

    let mut prompt = Prompt::new();
    let mut session = Session::new();
    println!("{}", render::message(&session.messages()[0]));

    'sessions: loop {
        let Some(form) = read_form(&mut prompt).await? else {
            break;
        };
        generate(&relay, &mut session, &form).await;

        loop {
            let Some(action) = prompt
                .ask("[ok] 完了 / [m] 修正 / [n] 新しいキャプションを生成 / [q] 終了")
                .await?
            else {
                break 'sessions;
            };

            match action.as_str() {
                "ok" => {
                    session.acknowledge();
                    if let Some(last) = session.messages().last() {
                        println!("{}", render::message(last));
                    }
                }
                "m" => {
                    let Some(text) = prompt.ask("修正内容を具体的に入力してください...").await?
                    else {
                        break 'sessions;
                    };
                    match session.modification_request(&text) {
                        Ok(request) => {
                            session.push_user(text.clone());
                            submit(&relay, &mut session, Ok(request)).await;
                        }
                        Err(e) => println!("! {}", e),
                    }
                }
                "n" => {
                    session.start_new();
                    println!("{}", render::message(&session.messages()[0]));
                    continue 'sessions;
                }
                "q" => break 'sessions,
                _ => println!("ok / m / n / q のいずれかを入力してください。"),
            }
        }
    }

    Ok(())
}
