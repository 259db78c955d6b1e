/// Edit distance between two strings, counted in Unicode scalar values.
///
/// With `damerau` set, a transposition of two adjacent characters counts as
/// a single edit.
pub fn levenshtein_distance(a: &str, b: &str, damerau: bool) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Three rolling rows: two back (for transpositions), previous, current
    let mut prev2: Vec<usize> = vec![0; b.len() + 1];
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur: Vec<usize> = vec![0; b.len() + 1];

    for i in 0..a.len() {
        cur[0] = i + 1;
        for j in 0..b.len() {
            let cost = usize::from(a[i] != b[j]);
            let mut n = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
            if damerau && i > 0 && j > 0 && a[i] == b[j - 1] && a[i - 1] == b[j] {
                n = n.min(prev2[j - 1] + 1);
            }
            cur[j + 1] = n;
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut cur);
    }

    prev[b.len()]
}
