use crate::{
    consts::{PAGE_SIZE, PG_CKSM_OFST, PG_PLSN_OFST, PG_TYPE_OFST},
    error::{DbError, ErrorKind},
    types::{DbResult, Lsn},
};

/// The page kinds stored in the common header's type tag. The tag is
/// a power of two so callers can pass a mask of acceptable kinds to
/// the buffer manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Tombstone,
    RootNode,
    DataList,
    InnerNode,
    RptRoot,
    VarHashPage,
    VarPage,
    VarTail,
}

/// Mask accepting every page kind.
pub const PG_ANY: u16 = 0xff;

impl PageKind {
    pub fn bit(&self) -> u16 {
        match self {
            PageKind::Tombstone => 1 << 0,
            PageKind::RootNode => 1 << 1,
            PageKind::DataList => 1 << 2,
            PageKind::InnerNode => 1 << 3,
            PageKind::RptRoot => 1 << 4,
            PageKind::VarHashPage => 1 << 5,
            PageKind::VarPage => 1 << 6,
            PageKind::VarTail => 1 << 7,
        }
    }

    pub fn from_tag(tag: u8) -> Option<PageKind> {
        match tag {
            1 => Some(PageKind::Tombstone),
            2 => Some(PageKind::RootNode),
            4 => Some(PageKind::DataList),
            8 => Some(PageKind::InnerNode),
            16 => Some(PageKind::RptRoot),
            32 => Some(PageKind::VarHashPage),
            64 => Some(PageKind::VarPage),
            128 => Some(PageKind::VarTail),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        self.bit() as u8
    }
}

/// One fixed-size page. The raw bytes are the unit of disk I/O and of
/// WAL images; everything else in the storage layer is a typed view
/// over them.
#[derive(Clone)]
pub struct Page {
    raw: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    pub fn new_zeroed() -> Self {
        Self {
            raw: Box::new([0u8; PAGE_SIZE]),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), PAGE_SIZE);
        let mut p = Self::new_zeroed();
        p.raw.copy_from_slice(bytes);
        p
    }

    pub fn raw(&self) -> &[u8; PAGE_SIZE] {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.raw
    }

    // Little-endian scalar accessors used by the typed page views.

    pub(crate) fn get_u8(&self, ofst: usize) -> u8 {
        self.raw[ofst]
    }

    pub(crate) fn put_u8(&mut self, ofst: usize, v: u8) {
        self.raw[ofst] = v;
    }

    pub(crate) fn get_u32(&self, ofst: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.raw[ofst..ofst + 4]);
        u32::from_le_bytes(b)
    }

    pub(crate) fn put_u32(&mut self, ofst: usize, v: u32) {
        self.raw[ofst..ofst + 4].copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn get_u64(&self, ofst: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.raw[ofst..ofst + 8]);
        u64::from_le_bytes(b)
    }

    pub(crate) fn put_u64(&mut self, ofst: usize, v: u64) {
        self.raw[ofst..ofst + 8].copy_from_slice(&v.to_le_bytes());
    }

    // Common header.

    pub fn get_checksum(&self) -> u32 {
        self.get_u32(PG_CKSM_OFST)
    }

    pub fn compute_checksum(&self) -> u32 {
        crc32c::crc32c(&self.raw[PG_TYPE_OFST..])
    }

    pub fn update_checksum(&mut self) {
        let c = self.compute_checksum();
        self.put_u32(PG_CKSM_OFST, c);
    }

    pub fn get_kind(&self) -> Option<PageKind> {
        PageKind::from_tag(self.get_u8(PG_TYPE_OFST))
    }

    pub fn set_kind(&mut self, kind: PageKind) {
        self.put_u8(PG_TYPE_OFST, kind.tag());
    }

    pub fn get_page_lsn(&self) -> Lsn {
        self.get_u64(PG_PLSN_OFST)
    }

    pub fn set_page_lsn(&mut self, lsn: Lsn) {
        self.put_u64(PG_PLSN_OFST, lsn);
    }

    /// Reset the page to an empty layout of the given kind. The page
    /// LSN is preserved by the caller's save path, not here.
    pub fn init_empty(&mut self, kind: PageKind) {
        for b in self.raw.iter_mut() {
            *b = 0;
        }
        self.set_kind(kind);
        match kind {
            PageKind::Tombstone => crate::storage::tombstone::init_empty(self),
            PageKind::RootNode => crate::storage::root_node::init_empty(self),
            PageKind::DataList => crate::storage::data_list::init_empty(self),
            PageKind::InnerNode => crate::storage::inner_node::init_empty(self),
            PageKind::RptRoot => crate::storage::rpt_root::init_empty(self),
            PageKind::VarHashPage => crate::storage::var_index::init_hash_empty(self),
            PageKind::VarPage => crate::storage::var_index::init_var_empty(self),
            PageKind::VarTail => crate::storage::var_index::init_tail_empty(self),
        }
    }

    /// Check the page as read from disk: stored checksum must match
    /// the raw bytes and the type tag must be one of the kinds the
    /// caller will accept.
    pub fn validate_for_db(&self, accept: u16) -> DbResult {
        if self.get_checksum() != self.compute_checksum() {
            return Err(DbError::corrupt(&format!(
                "page checksum mismatch: stored {:#010x}, computed {:#010x}",
                self.get_checksum(),
                self.compute_checksum()
            )));
        }

        match self.get_kind() {
            Some(kind) if kind.bit() & accept != 0 => Ok(()),
            Some(kind) => Err(DbError::new(
                ErrorKind::Corrupt,
                &format!("unexpected page kind {:?} (accept mask {:#04x})", kind, accept),
            )),
            None => Err(DbError::corrupt(&format!(
                "unknown page type tag {}",
                self.get_u8(PG_TYPE_OFST)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_round_trip() {
        let kinds = [
            PageKind::Tombstone,
            PageKind::RootNode,
            PageKind::DataList,
            PageKind::InnerNode,
            PageKind::RptRoot,
            PageKind::VarHashPage,
            PageKind::VarPage,
            PageKind::VarTail,
        ];
        for k in &kinds {
            assert_eq!(PageKind::from_tag(k.tag()), Some(*k));
        }
        assert_eq!(PageKind::from_tag(3), None);
    }

    #[test]
    fn test_checksum_detects_flip() {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::DataList);
        p.update_checksum();
        assert!(p.validate_for_db(PG_ANY).is_ok());

        p.raw_mut()[100] ^= 0x01;
        assert!(p.validate_for_db(PG_ANY).is_err());
    }

    #[test]
    fn test_validate_rejects_unexpected_kind() {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::Tombstone);
        p.update_checksum();
        assert!(p.validate_for_db(PageKind::DataList.bit()).is_err());
        assert!(p
            .validate_for_db(PageKind::DataList.bit() | PageKind::Tombstone.bit())
            .is_ok());
    }
}
