//! Customer data access object

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::database::{lock, parse_timestamp, DatabaseError};
use super::models::Customer;

const CUSTOMER_COLUMNS: &str =
    "id, name, friend_link, friend_code, user_id, slots, notes, created_at";

/// Data access object for Customer records
#[derive(Clone)]
pub struct CustomerStore {
    conn: Arc<Mutex<Connection>>,
}

impl CustomerStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Insert a customer and return it with its assigned id
    pub fn create(&self, customer: &Customer) -> Result<Customer, DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO customers (name, friend_link, friend_code, user_id, slots, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                customer.name,
                customer.friend_link,
                customer.friend_code,
                customer.user_id,
                customer.slots,
                customer.notes,
                customer.created_at.to_rfc3339(),
            ],
        )?;
        Ok(customer.clone().with_id(conn.last_insert_rowid()))
    }

    pub fn get(&self, id: i64) -> Result<Option<Customer>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let customer = conn
            .query_row(
                &format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS),
                params![id],
                Self::row_to_customer,
            )
            .optional()?;
        Ok(customer)
    }

    /// All customers sorted by name
    pub fn list(&self) -> Result<Vec<Customer>, DatabaseError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM customers ORDER BY name",
            CUSTOMER_COLUMNS
        ))?;
        let customers = stmt
            .query_map([], Self::row_to_customer)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(customers)
    }

    /// Replace editable fields
    pub fn update(&self, customer: &Customer) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        let changed = conn.execute(
            "UPDATE customers SET name = ?2, friend_link = ?3, friend_code = ?4, user_id = ?5, slots = ?6, notes = ?7
             WHERE id = ?1",
            params![
                customer.id,
                customer.name,
                customer.friend_link,
                customer.friend_code,
                customer.user_id,
                customer.slots,
                customer.notes,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "customer",
                id: customer.id,
            });
        }
        Ok(())
    }

    /// Delete a customer; teams keep their slots but lose the customer
    pub fn delete(&self, id: i64) -> Result<(), DatabaseError> {
        let conn = lock(&self.conn)?;
        conn.execute("DELETE FROM customers WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn row_to_customer(row: &rusqlite::Row) -> rusqlite::Result<Customer> {
        Ok(Customer {
            id: row.get(0)?,
            name: row.get(1)?,
            friend_link: row.get(2)?,
            friend_code: row.get(3)?,
            user_id: row.get(4)?,
            slots: row.get(5)?,
            notes: row.get(6)?,
            created_at: parse_timestamp(row, 7)?,
        })
    }
}
