use calamine::{open_workbook_auto, DataType, Reader};
use std::error::Error;
use std::path::Path;

const PREVIEW_ROWS: usize = 8;

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        other => other.to_string(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => return Err("usage: inspect_export <workbook.xlsx>".into()),
    };
    if !Path::new(&path).exists() {
        return Err(format!("{} does not exist", path).into());
    }

    let mut workbook = open_workbook_auto(&path)?;
    let sheet_names = workbook.sheet_names().to_vec();
    println!("{}: {} sheets", path, sheet_names.len());

    for name in sheet_names {
        let range = match workbook.worksheet_range(&name) {
            Some(range) => range?,
            None => continue,
        };
        let (rows, cols) = range.get_size();
        println!();
        println!("== {} ({} rows x {} cols)", name, rows, cols);

        for row in range.rows().take(PREVIEW_ROWS) {
            let cells: Vec<String> = row.iter().map(cell_text).collect();
            if cells.iter().any(|c| !c.is_empty()) {
                println!("  {}", cells.join(" | "));
            }
        }
        if rows > PREVIEW_ROWS {
            println!("  ... {} more rows", rows - PREVIEW_ROWS);
        }
    }

    Ok(())
}
