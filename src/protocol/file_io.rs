use std::{
    cell::RefCell,
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::EngineResult;

/// Where the sender reads payload bytes from.
pub trait FileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn size(&self) -> u64;
    fn is_open(&self) -> bool;
    fn close(&mut self);
}

/// Where the receiver puts accepted payload bytes.
pub trait FileSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;
    fn close(&mut self);
}

pub struct DiskFileSource {
    file: Option<File>,
    size: u64,
}

impl DiskFileSource {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let size = path.metadata()?.len();
        Ok(Self {
            file: Some(File::open(path)?),
            size,
        })
    }
}

impl FileSource for DiskFileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        self.file = None;
    }
}

pub struct DiskFileSink {
    file: Option<File>,
    path: PathBuf,
}

impl DiskFileSink {
    /// Creates the target in the user's download directory, appending
    /// ".1", ".2", ... when the name is already taken.
    pub fn create(file_name: &str) -> EngineResult<Self> {
        let Some(user_dirs) = directories::UserDirs::new() else {
            return Err(anyhow::anyhow!("Failed to get user directories"));
        };
        let Some(dir) = user_dirs.download_dir() else {
            return Err(anyhow::anyhow!("Failed to get download directory"));
        };
        Self::create_in(dir, file_name)
    }

    pub fn create_in(dir: &Path, file_name: &str) -> EngineResult<Self> {
        let f = if file_name.is_empty() {
            "new_file".to_string()
        } else {
            file_name.to_string()
        };
        let mut path = dir.join(&f);
        let mut i = 1;
        while path.exists() {
            path = dir.join(format!("{f}.{i}"));
            i += 1;
        }
        Ok(Self {
            file: Some(File::create(&path)?),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSink for DiskFileSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.write_all(data),
            None => Ok(()),
        }
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.sync_all() {
                log::error!("Failed to flush received file: {err}");
            }
        }
    }
}

/// In-memory source, for tests and embedders that already hold the data.
pub struct TestFileSource {
    data: Vec<u8>,
    pos: usize,
    open: bool,
}

impl TestFileSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            open: true,
        }
    }
}

impl FileSource for TestFileSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// In-memory sink sharing its buffer with the test that created it.
pub struct TestFileSink {
    data: Rc<RefCell<Vec<u8>>>,
}

impl TestFileSink {
    pub fn new() -> Self {
        Self {
            data: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn buffer(&self) -> Rc<RefCell<Vec<u8>>> {
        self.data.clone()
    }
}

impl Default for TestFileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSink for TestFileSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.data.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) {}
}
