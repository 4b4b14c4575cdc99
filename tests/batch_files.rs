//! Batch replay through history files on disk

use fraud_monitoring::features::CategoryEncoding;
use fraud_monitoring::runner::{read_transactions, write_featured, BatchRunner, FeaturedRow};
use std::sync::Arc;

const HISTORY: &str = "\
transaction_id,user_id,amount,timestamp,merchant_category,location,device_id,is_fraud
t3,1001,20.0,2024-01-01 09:00:00,Groceries,Berlin,10.0.0.2,0
t1,1000,50.0,2024-01-01 10:00:00,Groceries,Paris,10.0.0.1,0
t2,1000,3000.0,2024-01-01 11:00:00,Electronics,Paris,10.0.0.9,1
t4,1000,70.0,2024-01-02 10:00:00,Dining,Paris,10.0.0.1,
";

#[test]
fn test_history_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("history.csv");
    let output = dir.path().join("featured.csv");
    std::fs::write(&input, HISTORY).unwrap();

    let transactions = read_transactions(&input).unwrap();
    assert_eq!(transactions.len(), 4);
    assert_eq!(transactions[3].is_fraud, None);

    let runner = BatchRunner::fit(&transactions);
    let rows = runner.run(transactions).unwrap();
    write_featured(&output, &rows).unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert!(header.ends_with(&[
        "hour_of_day".to_string(),
        "day_of_week".to_string(),
        "tx_count_24h".to_string(),
        "avg_spend_user".to_string(),
        "amount_deviation".to_string(),
        "merchant_cat_code".to_string(),
    ]));

    let written: Vec<FeaturedRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
    let ids: Vec<&str> = written.iter().map(|r| r.transaction_id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2", "t4", "t3"]);

    let spike = &written[1];
    assert_eq!(spike.tx_count_24h, 2);
    assert_eq!(spike.avg_spend_user, 1525.0);
    assert_eq!(spike.is_fraud, Some(1));

    // t4 lands exactly 24h after t1, so t1 has left the window
    let next_day = &written[2];
    assert_eq!(next_day.tx_count_24h, 2);
    assert_eq!(next_day.avg_spend_user, 3120.0 / 3.0);
    assert_eq!(next_day.day_of_week, 1);

    // Dining, Electronics, Groceries
    assert_eq!(written[3].merchant_cat_code, 2);
    assert_eq!(spike.merchant_cat_code, 1);
}

#[test]
fn test_saved_encoding_reproduces_codes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("history.csv");
    let table = dir.path().join("encoding.json");
    std::fs::write(&input, HISTORY).unwrap();

    let transactions = read_transactions(&input).unwrap();
    let fitted = BatchRunner::fit(&transactions);
    fitted.encoding().save(&table).unwrap();
    let expected = fitted.run(transactions.clone()).unwrap();

    let reloaded = BatchRunner::new(Arc::new(CategoryEncoding::load(&table).unwrap()));
    assert_eq!(reloaded.encoding().version(), fitted.encoding().version());
    assert_eq!(reloaded.run(transactions).unwrap(), expected);
}

#[test]
fn test_sub_second_timestamps_are_written_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("history.csv");
    let output = dir.path().join("featured.csv");
    std::fs::write(
        &input,
        "transaction_id,user_id,amount,timestamp,merchant_category,location,device_id\n\
         t1,1,5.0,2024-01-01T10:00:00.750+02:00,Dining,Paris,10.0.0.1\n\
         t2,1,7.0,2024-01-01 08:00:01.250,Dining,Paris,10.0.0.1\n",
    )
    .unwrap();

    let transactions = read_transactions(&input).unwrap();
    let rows = BatchRunner::fit(&transactions).run(transactions.clone()).unwrap();
    write_featured(&output, &rows).unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    assert!(written.contains("t1,1,5.0,2024-01-01 08:00:00.750,"));
    assert!(written.contains("t2,1,7.0,2024-01-01 08:00:01.250,"));

    let reread: Vec<FeaturedRow> = csv::Reader::from_path(&output)
        .unwrap()
        .deserialize()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(reread[0].timestamp, transactions[0].timestamp);
    assert_eq!(reread[1].timestamp, transactions[1].timestamp);
}

#[test]
fn test_malformed_row_reports_line() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("history.csv");
    std::fs::write(
        &input,
        "transaction_id,user_id,amount,timestamp,merchant_category,location,device_id\n\
         t1,1000,50.0,2024-01-01 10:00:00,Groceries,Paris,10.0.0.1\n\
         t2,1000,lots,2024-01-01 11:00:00,Groceries,Paris,10.0.0.1\n",
    )
    .unwrap();

    let err = read_transactions(&input).unwrap_err();
    assert!(format!("{err:#}").contains("line 3"));
}
