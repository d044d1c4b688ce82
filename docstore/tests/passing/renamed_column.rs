#![allow(warnings)]

use docstore::*;

catalog! {
    pub enum Ledger {
        Entries => Entry = "entries",
    }
}

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = Ledger::Entries)]
pub struct Entry {
    #[column(name = "entry_id")]
    pub id: Option<i64>,
    #[column(name = "amount_cents")]
    pub amount: i64,
}

fn main() {
    let entry = Entry { id: None, amount: 250 };
    let fields = entry.to_fields();
    assert_eq!(fields.columns().collect::<Vec<_>>(), vec!["entry_id", "amount_cents"]);
    assert_eq!(Entry::from_fields(fields).unwrap(), entry);
    assert!(Entry::schema().has_assigned_key());
}
