//! Secondary index maintenance across writes.

#[cfg(test)]
mod tests {
    use minidyn_core::MiniDyn;
    use minidyn_model::DynamoDBErrorCode;
    use minidyn_model::input::{DeleteItemInput, GetItemInput, PutItemInput, UpdateItemInput};
    use minidyn_model::types::ReturnValue;

    use crate::{
        attrs, client, create_pokedex, n, names, pokemon, put, query_type, s, test_table_name,
    };

    fn pokedex() -> anyhow::Result<(MiniDyn, String)> {
        let client = client();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur"))?;
        put(&client, &table, pokemon("004", "fire", 5, "Charmander"))?;
        Ok((client, table))
    }

    fn by_type(client: &MiniDyn, table: &str, kind: &str) -> anyhow::Result<Vec<String>> {
        let out = client.query(query_type(table, Some("by-type"), kind))?;
        Ok(names(&out.items))
    }

    #[test]
    fn test_should_move_item_between_index_partitions() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        assert_eq!(by_type(&client, &table, "grass")?, vec!["Bulbasaur"]);

        let out = client.update_item(UpdateItemInput {
            table_name: table.clone(),
            key: attrs(&[("id", s("001"))]),
            update_expression: Some("SET #t = :t".to_owned()),
            expression_attribute_names: [("#t".to_owned(), "type".to_owned())].into(),
            expression_attribute_values: attrs(&[(":t", s("poison"))]),
            return_values: Some(ReturnValue::UpdatedOld),
            ..Default::default()
        })?;
        assert_eq!(out.attributes, attrs(&[("type", s("grass"))]));

        assert!(by_type(&client, &table, "grass")?.is_empty());
        assert_eq!(by_type(&client, &table, "poison")?, vec!["Bulbasaur"]);
        assert_eq!(by_type(&client, &table, "fire")?, vec!["Charmander"]);
        Ok(())
    }

    #[test]
    fn test_should_drop_item_from_index_when_key_attribute_removed() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        client.update_item(UpdateItemInput {
            table_name: table.clone(),
            key: attrs(&[("id", s("004"))]),
            update_expression: Some("REMOVE #t".to_owned()),
            expression_attribute_names: [("#t".to_owned(), "type".to_owned())].into(),
            ..Default::default()
        })?;
        assert!(by_type(&client, &table, "fire")?.is_empty());

        let item = client
            .get_item(GetItemInput {
                table_name: table.clone(),
                key: attrs(&[("id", s("004"))]),
                ..Default::default()
            })?
            .item;
        assert!(item.is_some_and(|item| !item.contains_key("type")));
        Ok(())
    }

    #[test]
    fn test_should_remove_deleted_item_from_index() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        let delete = DeleteItemInput {
            table_name: table.clone(),
            key: attrs(&[("id", s("001"))]),
            return_values: Some(ReturnValue::AllOld),
            ..Default::default()
        };
        let out = client.delete_item(delete.clone())?;
        assert_eq!(out.attributes, pokemon("001", "grass", 5, "Bulbasaur"));
        assert!(by_type(&client, &table, "grass")?.is_empty());

        let again = client.delete_item(delete)?;
        assert!(again.attributes.is_empty());
        Ok(())
    }

    #[test]
    fn test_should_leave_item_and_index_on_failed_condition() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        let err = client
            .put_item(PutItemInput {
                table_name: table.clone(),
                item: pokemon("001", "poison", 9, "Bulbasaur"),
                condition_expression: Some("#l > :l".to_owned()),
                expression_attribute_names: [("#l".to_owned(), "level".to_owned())].into(),
                expression_attribute_values: attrs(&[(":l", n("10"))]),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ConditionalCheckFailedException);

        assert_eq!(by_type(&client, &table, "grass")?, vec!["Bulbasaur"]);
        assert!(by_type(&client, &table, "poison")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_should_leave_item_and_index_on_failed_update() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        let get = || {
            client
                .get_item(GetItemInput {
                    table_name: table.clone(),
                    key: attrs(&[("id", s("001"))]),
                    ..Default::default()
                })
                .map(|out| out.item)
        };
        let before = get()?;

        let err = client
            .update_item(UpdateItemInput {
                table_name: table.clone(),
                key: attrs(&[("id", s("001"))]),
                update_expression: Some("SET #t = :t".to_owned()),
                condition_expression: Some("#l > :l".to_owned()),
                expression_attribute_names: [
                    ("#t".to_owned(), "type".to_owned()),
                    ("#l".to_owned(), "level".to_owned()),
                ]
                .into(),
                expression_attribute_values: attrs(&[(":t", s("poison")), (":l", n("10"))]),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ConditionalCheckFailedException);

        let err = client
            .update_item(UpdateItemInput {
                table_name: table.clone(),
                key: attrs(&[("id", s("001"))]),
                update_expression: Some("SET #l = :l ADD #t :one".to_owned()),
                expression_attribute_names: [
                    ("#t".to_owned(), "type".to_owned()),
                    ("#l".to_owned(), "level".to_owned()),
                ]
                .into(),
                expression_attribute_values: attrs(&[(":l", n("99")), (":one", n("1"))]),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ValidationException);

        assert_eq!(get()?, before);
        assert_eq!(by_type(&client, &table, "grass")?, vec!["Bulbasaur"]);
        assert!(by_type(&client, &table, "poison")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_should_reject_out_of_range_numbers() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        for level in ["1e9223372036854775807", "1e-9223372036854775808", "1e126"] {
            let mut item = pokemon("150", "psychic", 70, "Mewtwo");
            item.insert("level".to_owned(), n(level));
            let err = put(&client, &table, item).unwrap_err();
            assert!(err.to_string().contains("ValidationException"), "{level}: {err}");
        }
        assert!(by_type(&client, &table, "psychic")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_should_guard_creation_with_attribute_not_exists() -> anyhow::Result<()> {
        let (client, table) = pokedex()?;
        let create_once = |id: &str| {
            client.update_item(UpdateItemInput {
                table_name: table.clone(),
                key: attrs(&[("id", s(id))]),
                update_expression: Some("SET #t = :t, #n = :n".to_owned()),
                condition_expression: Some("attribute_not_exists(id)".to_owned()),
                expression_attribute_names: [
                    ("#t".to_owned(), "type".to_owned()),
                    ("#n".to_owned(), "name".to_owned()),
                ]
                .into(),
                expression_attribute_values: attrs(&[(":t", s("water")), (":n", s("Squirtle"))]),
                ..Default::default()
            })
        };

        create_once("007")?;
        assert_eq!(by_type(&client, &table, "water")?, vec!["Squirtle"]);

        let err = create_once("007").unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ConditionalCheckFailedException);
        Ok(())
    }
}
