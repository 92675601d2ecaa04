//! Fault injection as seen by a caller.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use minidyn_core::{FailureCondition, MiniDynConfig};
    use minidyn_model::DynamoDBErrorCode;
    use minidyn_model::input::{BatchWriteItemInput, DescribeTableInput, GetItemInput};
    use minidyn_model::types::WriteRequest;

    use crate::{attrs, client, client_with, create_pokedex, pokemon, put, s, test_table_name};

    fn get(table: &str) -> GetItemInput {
        GetItemInput {
            table_name: table.to_owned(),
            key: attrs(&[("id", s("001"))]),
            ..Default::default()
        }
    }

    #[test]
    fn test_should_emulate_failures_until_cleared() -> anyhow::Result<()> {
        let client = client();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur"))?;

        client.emulate_failure(FailureCondition::InternalServerError);
        let err = client.get_item(get(&table)).unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::InternalServerError);

        client.emulate_failure(FailureCondition::DeprecatedTable);
        let err = client.get_item(get(&table)).unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ResourceNotFoundException);
        client.describe_table(DescribeTableInput {
            table_name: table.clone(),
        })?;

        client.emulate_failure(FailureCondition::None);
        assert!(client.get_item(get(&table))?.item.is_some());
        Ok(())
    }

    #[test]
    fn test_should_toggle_forced_failure() -> anyhow::Result<()> {
        let client = client();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;

        client.activate_force_failure();
        let err = put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur")).unwrap_err();
        assert!(err.to_string().contains("forced failure"));

        client.deactivate_force_failure();
        put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur"))?;
        Ok(())
    }

    #[test]
    fn test_should_return_every_batch_write_as_unprocessed() -> anyhow::Result<()> {
        let client = client_with(
            MiniDynConfig::builder()
                .return_unprocessed_items(true)
                .build(),
        );
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        let requests = vec![
            WriteRequest::put(pokemon("001", "grass", 5, "Bulbasaur")),
            WriteRequest::put(pokemon("004", "fire", 5, "Charmander")),
        ];
        let input = BatchWriteItemInput {
            request_items: HashMap::from([(table.clone(), requests)]),
        };

        let out = client.batch_write_item(input.clone())?;
        assert_eq!(out.unprocessed_items.get(&table).map(Vec::len), Some(2));
        assert!(client.get_item(get(&table))?.item.is_none());

        client.set_return_unprocessed_items(false);
        let out = client.batch_write_item(input)?;
        assert!(out.unprocessed_items.is_empty());
        assert!(client.get_item(get(&table))?.item.is_some());
        Ok(())
    }

    #[test]
    fn test_should_start_failing_when_configured() -> anyhow::Result<()> {
        let client = client_with(MiniDynConfig::builder().force_failure(true).build());
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        assert!(client.get_item(get(&table)).is_err());
        Ok(())
    }
}
