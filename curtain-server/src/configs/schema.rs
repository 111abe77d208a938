use crate::models::{CurtainOperationTable, ErrorLogTable, LightReadingTable, SystemConfigTable, Table};

pub struct SchemaManager {
    tables: Vec<Box<dyn Table>>,
}

impl SchemaManager {
    pub fn new(mut tables: Vec<Box<dyn Table>>) -> Self {
        Self::sort_tables(&mut tables);
        Self { tables }
    }

    /// Orders tables so every table follows the ones it depends on.
    fn sort_tables(tables: &mut Vec<Box<dyn Table>>) {
        let mut to_sort = std::mem::take(tables);
        let mut deps_list: Vec<_> = to_sort.iter().map(|t| t.dependencies()).collect();
        let mut sorted = Vec::with_capacity(to_sort.len());

        while !to_sort.is_empty() {
            let independent: Vec<usize> = deps_list
                .iter()
                .enumerate()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(i, _)| i)
                .collect();

            assert!(!independent.is_empty(), "Circular dependency detected or unresolved dependencies exist.");

            // Ascending indices, so the tail of `sorted` keeps declaration order.
            let mut ready = Vec::with_capacity(independent.len());
            for &index in independent.iter().rev() {
                ready.push(to_sort.swap_remove(index));
                deps_list.swap_remove(index);
            }
            sorted.extend(ready.into_iter().rev());

            for deps in deps_list.iter_mut() {
                deps.retain(|dep| !sorted.iter().any(|table| table.name() == *dep));
            }
        }

        *tables = sorted;
    }

    pub fn create_schema(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.create()).collect()
    }

    pub fn dispose_schema(&self) -> Vec<String> {
        self.tables.iter().rev().map(|table| table.dispose()).collect()
    }
}

impl Default for SchemaManager {
    fn default() -> Self {
        SchemaManager::new(vec![
            Box::new(LightReadingTable),
            Box::new(CurtainOperationTable),
            Box::new(SystemConfigTable),
            Box::new(ErrorLogTable),
        ])
    }
}
