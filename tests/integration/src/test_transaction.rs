//! Multi-table transactions over indexed tables.

#[cfg(test)]
mod tests {
    use minidyn_core::MiniDyn;
    use minidyn_model::DynamoDBErrorCode;
    use minidyn_model::input::{GetItemInput, TransactWriteItemsInput};
    use minidyn_model::types::{
        CancellationReason, ConditionCheck, TransactDelete, TransactPut, TransactUpdate,
        TransactWriteItem,
    };

    use crate::{
        attrs, client, create_evolutions, create_pokedex, names, pokemon, put, query_type, s,
        test_table_name,
    };

    struct Tables {
        pokedex: String,
        evolutions: String,
    }

    fn setup() -> anyhow::Result<(MiniDyn, Tables)> {
        let client = client();
        let tables = Tables {
            pokedex: test_table_name("pokedex"),
            evolutions: test_table_name("evolutions"),
        };
        create_pokedex(&client, &tables.pokedex)?;
        create_evolutions(&client, &tables.evolutions)?;
        put(&client, &tables.pokedex, pokemon("001", "grass", 5, "Bulbasaur"))?;
        put(&client, &tables.evolutions, pokemon("001", "grass", 5, "Bulbasaur"))?;
        Ok((client, tables))
    }

    /// Evolve Bulbasaur in the pokedex and record Ivysaur in the evolutions
    /// table, guarded by `guard` on the pokedex entry.
    fn evolve(tables: &Tables, guard: &str) -> TransactWriteItemsInput {
        TransactWriteItemsInput {
            transact_items: vec![
                TransactWriteItem {
                    update: Some(TransactUpdate {
                        table_name: tables.pokedex.clone(),
                        key: attrs(&[("id", s("001"))]),
                        update_expression: "SET #n = :n, #t = :t".to_owned(),
                        condition_expression: Some(guard.to_owned()),
                        expression_attribute_names: [
                            ("#n".to_owned(), "name".to_owned()),
                            ("#t".to_owned(), "type".to_owned()),
                        ]
                        .into(),
                        expression_attribute_values: attrs(&[
                            (":n", s("Ivysaur")),
                            (":t", s("poison")),
                        ]),
                    }),
                    ..Default::default()
                },
                TransactWriteItem {
                    put: Some(TransactPut {
                        table_name: tables.evolutions.clone(),
                        item: pokemon("002", "grass", 16, "Ivysaur"),
                        condition_expression: Some("attribute_not_exists(id)".to_owned()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                TransactWriteItem {
                    delete: Some(TransactDelete {
                        table_name: tables.evolutions.clone(),
                        key: attrs(&[("type", s("grass")), ("id", s("001"))]),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        }
    }

    fn pokedex_name(client: &MiniDyn, tables: &Tables) -> anyhow::Result<Option<String>> {
        let item = client
            .get_item(GetItemInput {
                table_name: tables.pokedex.clone(),
                key: attrs(&[("id", s("001"))]),
                ..Default::default()
            })?
            .item;
        Ok(item.and_then(|item| item.get("name").and_then(|v| v.as_s()).map(ToOwned::to_owned)))
    }

    #[test]
    fn test_should_commit_every_table_and_index() -> anyhow::Result<()> {
        let (client, tables) = setup()?;
        client.transact_write_items(evolve(&tables, "attribute_exists(id)"))?;

        assert_eq!(pokedex_name(&client, &tables)?.as_deref(), Some("Ivysaur"));
        let poison = client.query(query_type(&tables.pokedex, Some("by-type"), "poison"))?;
        assert_eq!(names(&poison.items), vec!["Ivysaur"]);
        let grass = client.query(query_type(&tables.evolutions, Some("by-level"), "grass"))?;
        assert_eq!(names(&grass.items), vec!["Ivysaur"]);
        Ok(())
    }

    #[test]
    fn test_should_roll_back_every_table_when_one_condition_fails() -> anyhow::Result<()> {
        let (client, tables) = setup()?;
        let err = client
            .transact_write_items(evolve(&tables, "attribute_not_exists(id)"))
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::TransactionCanceledException);
        assert_eq!(
            err.cancellation_reasons,
            vec![
                CancellationReason::conditional_check_failed(),
                CancellationReason::none(),
                CancellationReason::none(),
            ]
        );

        assert_eq!(pokedex_name(&client, &tables)?.as_deref(), Some("Bulbasaur"));
        let grass = client.query(query_type(&tables.pokedex, Some("by-type"), "grass"))?;
        assert_eq!(names(&grass.items), vec!["Bulbasaur"]);
        let evolutions = client.query(query_type(&tables.evolutions, None, "grass"))?;
        assert_eq!(names(&evolutions.items), vec!["Bulbasaur"]);
        Ok(())
    }

    #[test]
    fn test_should_cancel_on_failed_condition_check() -> anyhow::Result<()> {
        let (client, tables) = setup()?;
        let mut input = evolve(&tables, "attribute_exists(id)");
        input.transact_items.push(TransactWriteItem {
            condition_check: Some(ConditionCheck {
                table_name: tables.pokedex.clone(),
                key: attrs(&[("id", s("150"))]),
                condition_expression: "attribute_exists(id)".to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = client.transact_write_items(input).unwrap_err();
        assert_eq!(
            err.cancellation_reasons.last(),
            Some(&CancellationReason::conditional_check_failed())
        );
        assert_eq!(pokedex_name(&client, &tables)?.as_deref(), Some("Bulbasaur"));
        Ok(())
    }
}
