use std::collections::HashMap;

use ledger_payment_engine::{helpers::generate_sign, SqliteDatabase};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const MERCHANT_ID: &str = "1001";
pub const MERCHANT_KEY: &str = "burst-test-key";

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if let Err(e) = Sqlite::drop_database(url).await {
        debug!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    info!("🚀️ Test database {url} ready");
    db
}

pub fn random_db_path() -> String {
    format!("sqlite://{}/lpg_it_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub fn signed_request(out_trade_no: &str, money: &str) -> HashMap<String, String> {
    let mut params = [
        ("pid", MERCHANT_ID),
        ("type", "alipay"),
        ("out_trade_no", out_trade_no),
        ("notify_url", "http://example.com/notify"),
        ("return_url", "http://example.com/return"),
        ("name", "Burst order"),
        ("money", money),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect::<HashMap<_, _>>();
    let sign = generate_sign(&params, MERCHANT_KEY);
    params.insert("sign".to_string(), sign);
    params.insert("sign_type".to_string(), "MD5".to_string());
    params
}
