//! Query and scan pagination.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use minidyn_core::MiniDyn;
    use minidyn_model::AttributeValue;
    use minidyn_model::input::{QueryInput, ScanInput};

    use crate::{
        attrs, client, create_evolutions, n, names, pokemon, put, query_type, s, test_table_name,
    };

    fn seeded() -> anyhow::Result<(MiniDyn, String)> {
        let client = client();
        let table = test_table_name("evolutions");
        create_evolutions(&client, &table)?;
        for item in [
            pokemon("001", "grass", 5, "Bulbasaur"),
            pokemon("002", "grass", 16, "Ivysaur"),
            pokemon("003", "grass", 32, "Venusaur"),
            pokemon("004", "fire", 5, "Charmander"),
            pokemon("005", "fire", 16, "Charmeleon"),
            pokemon("007", "water", 5, "Squirtle"),
        ] {
            put(&client, &table, item)?;
        }
        Ok((client, table))
    }

    fn query_all_pages(client: &MiniDyn, input: &QueryInput) -> anyhow::Result<Vec<String>> {
        let mut input = input.clone();
        let mut seen = Vec::new();
        loop {
            let page = client.query(input.clone())?;
            seen.extend(names(&page.items));
            if page.last_evaluated_key.is_empty() {
                return Ok(seen);
            }
            input.exclusive_start_key = page.last_evaluated_key;
        }
    }

    #[test]
    fn test_should_return_cursor_on_empty_filtered_page() -> anyhow::Result<()> {
        let (client, table) = seeded()?;
        let mut input = query_type(&table, None, "grass");
        input.filter_expression = Some("#n = :n".to_owned());
        input.expression_attribute_names.insert("#n".to_owned(), "name".to_owned());
        input
            .expression_attribute_values
            .insert(":n".to_owned(), s("Venusaur"));
        input.limit = Some(2);

        let first = client.query(input.clone())?;
        assert!(first.items.is_empty());
        assert_eq!(first.count, 0);
        assert_eq!(first.scanned_count, 2);
        assert_eq!(
            first.last_evaluated_key,
            attrs(&[("type", s("grass")), ("id", s("002"))])
        );

        input.exclusive_start_key = first.last_evaluated_key;
        let second = client.query(input)?;
        assert_eq!(names(&second.items), vec!["Venusaur"]);
        assert!(second.last_evaluated_key.is_empty());
        Ok(())
    }

    #[test]
    fn test_should_chain_query_pages_like_one_call() -> anyhow::Result<()> {
        let (client, table) = seeded()?;
        let unlimited = client.query(query_type(&table, None, "grass"))?;
        assert_eq!(
            names(&unlimited.items),
            vec!["Bulbasaur", "Ivysaur", "Venusaur"]
        );

        for limit in 1..=4 {
            let mut input = query_type(&table, None, "grass");
            input.limit = Some(limit);
            assert_eq!(query_all_pages(&client, &input)?, names(&unlimited.items));
        }
        Ok(())
    }

    #[test]
    fn test_should_chain_scan_pages_like_one_call() -> anyhow::Result<()> {
        let (client, table) = seeded()?;
        let scan = |limit: Option<i32>, start: HashMap<String, AttributeValue>| {
            client.scan(ScanInput {
                table_name: table.clone(),
                limit,
                exclusive_start_key: start,
                ..Default::default()
            })
        };
        let unlimited = names(&scan(None, HashMap::new())?.items);
        assert_eq!(unlimited.len(), 6);

        let mut paged = Vec::new();
        let mut start = HashMap::new();
        loop {
            let page = scan(Some(4), start)?;
            paged.extend(names(&page.items));
            if page.last_evaluated_key.is_empty() {
                break;
            }
            start = page.last_evaluated_key;
        }
        assert_eq!(paged, unlimited);
        Ok(())
    }

    #[test]
    fn test_should_query_sort_range_in_reverse() -> anyhow::Result<()> {
        let (client, table) = seeded()?;
        let mut input = query_type(&table, None, "grass");
        input.key_condition_expression = Some("#t = :t AND id >= :id".to_owned());
        input
            .expression_attribute_values
            .insert(":id".to_owned(), s("002"));
        input.scan_index_forward = Some(false);
        let out = client.query(input)?;
        assert_eq!(names(&out.items), vec!["Venusaur", "Ivysaur"]);
        Ok(())
    }

    #[test]
    fn test_should_query_local_index_by_level() -> anyhow::Result<()> {
        let (client, table) = seeded()?;
        let mut input = query_type(&table, Some("by-level"), "fire");
        input.key_condition_expression = Some("#t = :t AND #l BETWEEN :lo AND :hi".to_owned());
        input.expression_attribute_names.insert("#l".to_owned(), "level".to_owned());
        input.expression_attribute_values.extend(attrs(&[(":lo", n("10")), (":hi", n("20"))]));
        input.projection_expression = Some("#l, id".to_owned());
        let out = client.query(input)?;
        assert_eq!(out.items, vec![attrs(&[("level", n("16")), ("id", s("005"))])]);
        Ok(())
    }

    #[test]
    fn test_should_reject_unknown_index() -> anyhow::Result<()> {
        let (client, table) = seeded()?;
        let err = client
            .query(query_type(&table, Some("by-name"), "grass"))
            .unwrap_err();
        assert_eq!(
            err.message,
            "The table does not have the specified index: by-name"
        );
        Ok(())
    }
}
