//! A1 notation helpers for Sheets ranges like `Contacts!C2:H`.

/// Zero-based column index to letters, bijective base-26 (0 → A, 26 → AA).
pub fn num_to_col(num: usize) -> String {
    let mut letters = Vec::new();
    let mut n = num;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
        n -= 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Column letters to a zero-based index. Non-letters are ignored; empty is 0.
/// Saturates instead of overflowing on absurdly long input.
pub fn col_to_num(col: &str) -> usize {
    let num = col
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .try_fold(0usize, |acc, c| {
            acc.checked_mul(26)?
                .checked_add((c.to_ascii_uppercase() as u8 - b'A' + 1) as usize)
        })
        .unwrap_or(usize::MAX);
    num.saturating_sub(1)
}

/// `B`, `C2`, `AB10`: one to three column letters, optional row digits.
fn is_cell(part: &str) -> bool {
    let letters = part.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    (1..=3).contains(&letters) && part[letters..].chars().all(|c| c.is_ascii_digit())
}

fn is_cell_range(target: &str) -> bool {
    match target.split_once(':') {
        Some((start, end)) => is_cell(start) && is_cell(end),
        None => is_cell(target),
    }
}

/// Splits a range into sheet name and cell part. A range without `!` is a
/// cell reference only when it looks like one; otherwise it names a sheet.
fn split_range(range: &str) -> (Option<&str>, &str) {
    match range.split_once('!') {
        Some((name, cells)) => (Some(name).filter(|n| !n.is_empty()), cells),
        None if is_cell_range(range) => (None, range),
        None => (Some(range).filter(|n| !n.is_empty()), ""),
    }
}

/// Sheet name of the range: the part before `!`, or a bare sheet name.
pub fn sheet_name(range: &str) -> Option<&str> {
    split_range(range).0
}

fn range_start(range: &str) -> &str {
    let cells = split_range(range).1;
    cells.split(':').next().unwrap_or(cells)
}

/// Zero-based column index where the range starts (`C2:H` → 2).
pub fn start_col_index(range: &str) -> usize {
    let letters: String = range_start(range)
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    col_to_num(&letters)
}

/// One-based row where the range starts; whole-column and whole-sheet
/// ranges start at 1.
pub fn start_row(range: &str) -> u32 {
    let digits: String = range_start(range)
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|row| *row > 0).unwrap_or(1)
}
