//! Names of the operations the engine serves.

use std::fmt;

macro_rules! operations {
    ($($name:ident: $data_plane:literal,)*) => {
        /// One engine operation, used for fault checks and log fields.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Operation {
            $($name,)*
        }

        impl Operation {
            /// Every operation, table management first.
            pub const ALL: &'static [Operation] = &[$(Self::$name,)*];

            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// Item reads and writes, the only operations faults apply to.
            #[must_use]
            pub fn is_data_plane(&self) -> bool {
                match self {
                    $(Self::$name => $data_plane,)*
                }
            }
        }
    };
}

operations! {
    CreateTable: false,
    DeleteTable: false,
    DescribeTable: false,
    UpdateTable: false,
    ListTables: false,
    PutItem: true,
    GetItem: true,
    UpdateItem: true,
    DeleteItem: true,
    Query: true,
    Scan: true,
    BatchGetItem: true,
    BatchWriteItem: true,
    TransactWriteItems: true,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_split_table_management_from_data_plane() {
        let (data, ddl): (Vec<_>, Vec<_>) =
            Operation::ALL.iter().partition(|op| op.is_data_plane());
        assert_eq!(ddl.len(), 5);
        assert!(data.contains(&&Operation::TransactWriteItems));
        assert!(ddl.iter().all(|op| op.as_str().ends_with("Table") || op.as_str() == "ListTables"));
    }

    #[test]
    fn test_should_display_operation_name() {
        assert_eq!(Operation::BatchWriteItem.to_string(), "BatchWriteItem");
    }
}
