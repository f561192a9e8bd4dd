//! Cached RFC 9110 `date` header value.
//!
//! Rendering the date is not free, so the event loop renders it at most
//! once per poll iteration and hands the cached bytes to the response
//! writer. A refreshed stamp never forces a response re-render; the
//! writer splices it in with a vectored write.

pub(crate) struct DateStamp {
    value: Box<[u8]>,
}

impl DateStamp {
    pub(crate) fn now() -> Self {
        let mut buf = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut buf);

        Self {
            value: Box::from(buf.as_ref()),
        }
    }

    #[inline(always)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    pub(crate) fn refresh(&mut self) {
        *self = Self::now();
    }

    #[cfg(test)]
    pub(crate) fn pinned(value: &[u8; 29]) -> Self {
        Self {
            value: Box::from(&value[..]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_looks_like_an_imf_fixdate() {
        let stamp = DateStamp::now();
        let bytes = stamp.as_bytes();

        // "Sun, 06 Nov 1994 08:49:37 GMT"
        assert_eq!(bytes.len(), 29);
        assert_eq!(&bytes[3..5], b", ");
        assert!(bytes.ends_with(b" GMT"));
    }

    #[test]
    fn refresh_keeps_the_width() {
        let mut stamp = DateStamp::now();
        stamp.refresh();
        assert_eq!(stamp.as_bytes().len(), 29);
    }
}
