use crate::{
    storage::{
        page::{Page, PageKind},
        DataList, InnerNode, RootNode, RptRoot, Tombstone,
    },
    types::PGNO_NULL,
};

fn fmt_pgno(pg: u64) -> String {
    if pg == PGNO_NULL {
        "null".to_string()
    } else {
        pg.to_string()
    }
}

/// Human-readable dump of one page: the common header, the typed
/// fields, and a short hex prefix of the payload.
pub fn page_depiction(p: &Page) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "├── checksum {:#010x} (computed {:#010x})\n",
        p.get_checksum(),
        p.compute_checksum()
    ));
    out.push_str(&format!("├── kind {:?}\n", p.get_kind()));
    out.push_str(&format!("├── page lsn {}\n", p.get_page_lsn()));

    match p.get_kind() {
        Some(PageKind::RootNode) => {
            out.push_str(&format!(
                "└── first tombstone {}, master lsn {}\n",
                fmt_pgno(p.rn_get_first_tombstone()),
                p.rn_get_master_lsn()
            ));
        }
        Some(PageKind::Tombstone) => {
            out.push_str(&format!("└── next {}\n", fmt_pgno(p.ts_get_next())));
        }
        Some(PageKind::DataList) => {
            let data = p.dl_data();
            let head = &data[..data.len().min(16)];
            out.push_str(&format!(
                "└── prev {}, next {}, used {}, data {}{}\n",
                fmt_pgno(p.dl_get_prev()),
                fmt_pgno(p.dl_get_next()),
                p.dl_used(),
                hex::encode(head),
                if data.len() > 16 { "..." } else { "" }
            ));
        }
        Some(PageKind::InnerNode) => {
            let nkeys = p.in_nkeys();
            let keys: Vec<u64> = (0..nkeys).map(|i| p.in_get_key(i)).collect();
            out.push_str(&format!(
                "└── prev {}, next {}, children {:?}, keys {:?}\n",
                fmt_pgno(p.in_get_prev()),
                fmt_pgno(p.in_get_next()),
                p.in_children(),
                keys
            ));
        }
        Some(PageKind::RptRoot) => {
            out.push_str(&format!(
                "└── root {}, nbytes {}\n",
                fmt_pgno(p.rr_get_root()),
                p.rr_get_nbytes()
            ));
        }
        _ => {
            out.push_str(&format!(
                "└── raw {}...\n",
                hex::encode(&p.raw()[..32.min(p.raw().len())])
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depiction_names_the_kind() {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::DataList);
        p.dl_append(&[0xab, 0xcd]);
        let d = page_depiction(&p);
        assert!(d.contains("DataList"));
        assert!(d.contains("abcd"));
    }
}
