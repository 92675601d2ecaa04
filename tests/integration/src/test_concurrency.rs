//! Concurrent writers on one client.

#[cfg(test)]
mod tests {
    use std::thread;

    use minidyn_model::DynamoDBErrorCode;
    use minidyn_model::input::{GetItemInput, TransactWriteItemsInput, UpdateItemInput};
    use minidyn_model::types::{TransactUpdate, TransactWriteItem};

    use crate::{attrs, client, create_pokedex, n, pokemon, put, s, test_table_name};

    const THREADS: usize = 8;
    const ROUNDS: usize = 25;

    #[test]
    fn test_should_not_lose_concurrent_counter_updates() -> anyhow::Result<()> {
        let client = client();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    for _ in 0..ROUNDS {
                        client
                            .update_item(UpdateItemInput {
                                table_name: table.clone(),
                                key: attrs(&[("id", s("001"))]),
                                update_expression: Some("ADD seen :one".to_owned()),
                                expression_attribute_values: attrs(&[(":one", n("1"))]),
                                ..Default::default()
                            })
                            .unwrap();
                    }
                });
            }
        });

        let item = client
            .get_item(GetItemInput {
                table_name: table,
                key: attrs(&[("id", s("001"))]),
                ..Default::default()
            })?
            .item;
        let expected = (THREADS * ROUNDS).to_string();
        assert_eq!(item.and_then(|i| i.get("seen").cloned()), Some(n(&expected)));
        Ok(())
    }

    #[test]
    fn test_should_let_one_racing_transaction_claim_an_item() -> anyhow::Result<()> {
        let client = client();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        put(&client, &table, pokemon("025", "electric", 5, "Pikachu"))?;

        let claim = |trainer: String| TransactWriteItemsInput {
            transact_items: vec![TransactWriteItem {
                update: Some(TransactUpdate {
                    table_name: table.clone(),
                    key: attrs(&[("id", s("025"))]),
                    update_expression: "SET trainer = :t".to_owned(),
                    condition_expression: Some("attribute_not_exists(trainer)".to_owned()),
                    expression_attribute_values: attrs(&[(":t", s(&trainer))]),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };

        let outcomes: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|i| {
                    let input = claim(format!("trainer-{i}"));
                    scope.spawn(|| client.transact_write_items(input))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });

        let committed = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1);
        for err in outcomes.into_iter().filter_map(Result::err) {
            assert_eq!(err.code, DynamoDBErrorCode::TransactionCanceledException);
        }
        tracing::info!(threads = THREADS, "one claim committed");
        Ok(())
    }
}
