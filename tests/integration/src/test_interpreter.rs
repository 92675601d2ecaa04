//! Switching between the language and native interpreters.

#[cfg(test)]
mod tests {
    use minidyn_core::{Interpreter, InterpreterKind, MiniDynConfig, Value};
    use minidyn_model::DynamoDBErrorCode;
    use minidyn_model::input::{GetItemInput, ScanInput, UpdateItemInput};

    use crate::{
        attrs, client, client_with, create_pokedex, n, names, pokemon, put, s, test_table_name,
    };

    const LEVEL_UP: &str = "SET #l = #l + :inc";

    fn level_up(table: &str) -> UpdateItemInput {
        UpdateItemInput {
            table_name: table.to_owned(),
            key: attrs(&[("id", s("001"))]),
            update_expression: Some(LEVEL_UP.to_owned()),
            expression_attribute_names: [("#l".to_owned(), "level".to_owned())].into(),
            expression_attribute_values: attrs(&[(":inc", n("1"))]),
            ..Default::default()
        }
    }

    #[test]
    fn test_should_start_with_configured_interpreter() -> anyhow::Result<()> {
        let client = client_with(
            MiniDynConfig::builder()
                .interpreter(InterpreterKind::Native)
                .build(),
        );
        assert_eq!(client.interpreter().kind(), InterpreterKind::Native);

        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur"))?;
        let err = client.update_item(level_up(&table)).unwrap_err();
        assert_eq!(err.code, DynamoDBErrorCode::ValidationException);
        assert!(err.message.contains(LEVEL_UP));

        client.use_language_interpreter();
        assert_eq!(client.interpreter().kind(), InterpreterKind::Language);
        client.update_item(level_up(&table))?;
        Ok(())
    }

    #[test]
    fn test_should_run_registered_handlers() -> anyhow::Result<()> {
        let client = client();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur"))?;
        put(&client, &table, pokemon("004", "fire", 5, "Charmander"))?;

        let native = client.use_native_interpreter();
        native.add_updater(&table, LEVEL_UP, |item, _| {
            item.insert("level".to_owned(), Value::from(6_i64));
        });
        native.add_matcher(&table, "#t = :t", |item, values| {
            item.get("type") == values.get(":t")
        });

        client.update_item(level_up(&table))?;
        let item = client
            .get_item(GetItemInput {
                table_name: table.clone(),
                key: attrs(&[("id", s("001"))]),
                ..Default::default()
            })?
            .item;
        assert_eq!(item.and_then(|i| i.get("level").cloned()), Some(n("6")));

        let out = client.scan(ScanInput {
            table_name: table.clone(),
            filter_expression: Some("#t = :t".to_owned()),
            expression_attribute_names: [("#t".to_owned(), "type".to_owned())].into(),
            expression_attribute_values: attrs(&[(":t", s("fire"))]),
            ..Default::default()
        })?;
        assert_eq!(names(&out.items), vec!["Charmander"]);
        Ok(())
    }

    #[test]
    fn test_should_keep_handlers_per_table() -> anyhow::Result<()> {
        let client = client();
        let first = test_table_name("pokedex");
        let second = test_table_name("pokedex");
        create_pokedex(&client, &first)?;
        create_pokedex(&client, &second)?;
        put(&client, &second, pokemon("001", "grass", 5, "Bulbasaur"))?;

        client
            .use_native_interpreter()
            .add_updater(&first, LEVEL_UP, |_, _| {});
        let err = client.update_item(level_up(&second)).unwrap_err();
        assert!(err.message.starts_with("unhandled expression"));
        Ok(())
    }

    #[test]
    fn test_should_evaluate_with_debug_logging() -> anyhow::Result<()> {
        let client = client();
        client.activate_debug();
        let table = test_table_name("pokedex");
        create_pokedex(&client, &table)?;
        put(&client, &table, pokemon("001", "grass", 5, "Bulbasaur"))?;

        for _ in 0..2 {
            client.update_item(level_up(&table))?;
        }
        let item = client
            .get_item(GetItemInput {
                table_name: table,
                key: attrs(&[("id", s("001"))]),
                ..Default::default()
            })?
            .item;
        assert_eq!(item.and_then(|i| i.get("level").cloned()), Some(n("7")));
        tracing::debug!("debug interpreter evaluated both updates");
        Ok(())
    }
}
