pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        base_url: String,
        redis_url: Option<String>,
        mailer_url: Option<String>,
        mailer_token: Option<String>,
    },
}
