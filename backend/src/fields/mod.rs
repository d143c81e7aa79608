//! Built-in import contexts.
//!
//! Each context is a plain [`FieldRegistry`]: the system fields a sheet is
//! mapped onto, their header aliases (Spanish and English spellings), the
//! validation mode and the destination table.
//!
//! | Context | Mode | Table |
//! |---------|------|-------|
//! | `generic` | permissive | `records` |
//! | `purchase` | strict | `purchases` |
//! | `income_statement` | permissive | `income_statement_entries` |
//! | `accounting_entry` | strict + schema | `accounting_entries` |
//! | `tips` | permissive | `tips` |

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::models::{FieldRegistry, SystemField, ValidationMode};

/// Context used when none is given.
pub const DEFAULT_CONTEXT: &str = "generic";

static ACCOUNTING_ENTRY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/accounting-entry.json"))
        .expect("Invalid embedded schema")
});

/// Names of every built-in context.
pub fn contexts() -> Vec<&'static str> {
    vec!["generic", "purchase", "income_statement", "accounting_entry", "tips"]
}

/// Registry of a built-in context.
pub fn registry(context: &str) -> Option<FieldRegistry> {
    match context {
        "generic" => Some(generic()),
        "purchase" => Some(purchase()),
        "income_statement" => Some(income_statement()),
        "accounting_entry" => Some(accounting_entry()),
        "tips" => Some(tips()),
        _ => None,
    }
}

/// Every built-in registry.
pub fn all() -> Vec<FieldRegistry> {
    contexts().into_iter().filter_map(registry).collect()
}

fn date_field() -> SystemField {
    SystemField::new("date", "Fecha").with_aliases([
        "fecha",
        "fecha emision",
        "fecha emisión",
        "fecha documento",
        "date",
        "issue date",
    ])
}

fn amount_field() -> SystemField {
    SystemField::new("amount", "Monto").with_aliases([
        "monto",
        "total",
        "importe",
        "valor",
        "amount",
        "value",
    ])
}

/// Anything with a date, a description and an amount.
pub fn generic() -> FieldRegistry {
    FieldRegistry::new("generic", "records", ValidationMode::Permissive)
        .with_label("Registros generales")
        .with_field(date_field())
        .with_field(
            SystemField::new("description", "Descripción")
                .with_aliases(["descripcion", "descripción", "glosa", "detalle", "concepto", "description"]),
        )
        .with_field(amount_field())
        .with_field(SystemField::new("category", "Categoría").with_aliases(["categoria", "categoría", "category"]))
}

/// Supplier invoices. Date and total are required.
pub fn purchase() -> FieldRegistry {
    FieldRegistry::new("purchase", "purchases", ValidationMode::Strict)
        .with_label("Compras")
        .with_field(date_field().required())
        .with_field(
            SystemField::new("supplier", "Proveedor")
                .with_aliases(["proveedor", "razon social", "razón social", "supplier", "vendor"]),
        )
        .with_field(
            SystemField::new("supplier_tax_id", "RUT proveedor")
                .with_aliases(["rut", "tax id"])
                .identifier(),
        )
        .with_field(
            SystemField::new("document_number", "Folio")
                .with_aliases(["folio", "n° documento", "numero documento", "número", "invoice", "document"])
                .identifier(),
        )
        .with_field(SystemField::new("net", "Neto").with_aliases(["neto", "monto neto", "net"]))
        .with_field(SystemField::new("tax", "IVA").with_aliases(["iva", "impuesto", "tax", "vat"]))
        .with_field(amount_field().required())
}

/// Monthly results, usually uploaded as an account × month matrix.
pub fn income_statement() -> FieldRegistry {
    FieldRegistry::new("income_statement", "income_statement_entries", ValidationMode::Permissive)
        .with_label("Estado de resultados")
        .with_field(date_field())
        .with_field(
            SystemField::new("account_code", "Cuenta")
                .with_aliases(["cuenta", "codigo", "código", "account", "code"])
                .identifier(),
        )
        .with_field(
            SystemField::new("account_name", "Nombre cuenta")
                .with_aliases(["nombre", "nombre cuenta", "descripcion", "account name"]),
        )
        .with_field(amount_field())
        .with_field(SystemField::new("kind", "Tipo").with_aliases(["tipo", "kind", "type"]))
}

/// Journal lines, checked against an embedded schema.
pub fn accounting_entry() -> FieldRegistry {
    FieldRegistry::new("accounting_entry", "accounting_entries", ValidationMode::Strict)
        .with_label("Asientos contables")
        .with_field(date_field().required())
        .with_field(
            SystemField::new("account_code", "Cuenta")
                .with_aliases(["cuenta", "codigo cuenta", "código cuenta", "account"])
                .identifier()
                .required(),
        )
        .with_field(
            SystemField::new("description", "Glosa")
                .with_aliases(["glosa", "descripcion", "descripción", "detalle", "description"]),
        )
        .with_field(SystemField::new("debit", "Debe").with_aliases(["debe", "cargo", "debit"]))
        .with_field(SystemField::new("credit", "Haber").with_aliases(["haber", "abono", "credit"]))
        .with_schema(ACCOUNTING_ENTRY_SCHEMA.clone())
}

/// Tip pool per employee and shift.
pub fn tips() -> FieldRegistry {
    FieldRegistry::new("tips", "tips", ValidationMode::Permissive)
        .with_label("Propinas")
        .with_field(date_field())
        .with_field(
            SystemField::new("employee", "Empleado")
                .with_aliases(["empleado", "trabajador", "garzon", "garzón", "nombre", "employee", "waiter"]),
        )
        .with_field(SystemField::new("shift", "Turno").with_aliases(["turno", "shift"]))
        .with_field(
            SystemField::new("amount", "Propina")
                .with_aliases(["propina", "propinas", "monto", "total", "tip", "tips", "amount"]),
        )
}
